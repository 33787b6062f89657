use thiserror::Error;

use crate::store::StoreStatus;

/// Identity connection failed. Fatal: no client can be built without a
/// session.
#[derive(Debug, Clone, Error)]
#[error("failed to connect identity: {0}")]
pub struct ConnectError(pub String);

#[derive(Debug, Clone, Error)]
pub enum InstallError {
    /// The registration query itself failed; absence must not be assumed
    /// after a failed query, so no install is attempted.
    #[error("protocol registration query failed: {0}")]
    QueryFailed(StoreStatus),
    #[error("protocol configure call failed: {0}")]
    ConfigureFailed(StoreStatus),
    #[error("store call timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("record query failed: {0}")]
    QueryFailed(StoreStatus),
    #[error("store call timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("record write failed: {0}")]
    WriteFailed(StoreStatus),
    /// The record was written; only the forward to the recipient's node
    /// failed. No compensating delete; the record stays visible locally.
    #[error("record {record_id} written but forward to recipient failed: {status}")]
    ForwardFailed {
        record_id: String,
        status: StoreStatus,
    },
    #[error("store call timed out after {0}s")]
    Timeout(u64),
}
