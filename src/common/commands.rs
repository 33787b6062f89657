use crate::common::types::Did;

/// Lệnh frontend gửi xuống client task.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Write a ding addressed to `recipient` and forward it to their node.
    Compose { recipient: Did, note: String },
    /// Reconcile now instead of waiting for the next poll tick.
    Refresh,
    /// Stop the client loop; the poll timer dies with it.
    Shutdown,
}
