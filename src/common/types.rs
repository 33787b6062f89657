use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier naming a participant (self or peer). Compared only for
/// equality; the core never validates its shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Did {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Domain model đại diện một tin nhắn ding. Immutable once written; the core
/// never updates or deletes a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ding {
    pub sender: Did,
    pub recipient: Did,
    pub note: String,
    /// Human-readable local-clock timestamp, display only. The store's own
    /// creation order drives the sort, not this field.
    pub timestamp_written: String,
}

/// Derived sent/received partition of all known dings relative to one
/// identifier. Recomputed wholesale every reconciliation, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedView {
    /// Dings whose sender is self.
    pub sent: Vec<Ding>,
    /// Dings whose recipient is self. A self-addressed ding appears in both.
    pub received: Vec<Ding>,
}

impl ClassifiedView {
    /// Received then sent, concatenated: the combined list a frontend renders.
    pub fn all(&self) -> Vec<Ding> {
        let mut all = Vec::with_capacity(self.received.len() + self.sent.len());
        all.extend(self.received.iter().cloned());
        all.extend(self.sent.iter().cloned());
        all
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.received.is_empty()
    }
}

/// Outcome of a fully successful compose: written locally and forwarded to
/// the recipient's node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendStatus {
    pub record_id: String,
}
