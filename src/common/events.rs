use crate::common::types::{ClassifiedView, SendStatus};
use crate::error::{SendError, SyncError};

/// Sự kiện client task gửi lên frontend.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A reconciliation completed; this view replaces the previous one
    /// wholesale.
    ViewUpdated(ClassifiedView),
    /// A reconciliation failed; the previous view is still in effect.
    SyncFailed(SyncError),
    /// A ding was written and forwarded successfully.
    Sent(SendStatus),
    /// The write landed but forwarding to the recipient's node failed; the
    /// ding exists in a local-only state and is not resubmitted.
    SendIncomplete { record_id: String, reason: String },
    /// Nothing was written at all.
    SendFailed(SendError),
}
