pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::types::Did;
use crate::error::ConnectError;

/// Status detail returned by every store call: numeric code plus human
/// detail, in the 2xx range on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub code: u16,
    pub detail: String,
}

impl StoreStatus {
    pub fn ok() -> Self {
        Self {
            code: 200,
            detail: "OK".to_string(),
        }
    }

    pub fn accepted() -> Self {
        Self {
            code: 202,
            detail: "Accepted".to_string(),
        }
    }

    pub fn failure(code: u16, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAscending,
    CreatedDescending,
}

/// Filter for `RecordStore::query`. Protocol is always present; schema and
/// recipient narrow the result set for recipient-scoped queries.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub protocol: String,
    pub schema: Option<String>,
    pub recipient: Option<Did>,
    pub sort: Option<SortOrder>,
}

impl QueryFilter {
    pub fn protocol(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            schema: None,
            recipient: None,
            sort: None,
        }
    }
}

/// Routing metadata attached to a record write.
#[derive(Debug, Clone)]
pub struct WriteRouting {
    pub protocol: String,
    pub protocol_path: String,
    pub schema: String,
    pub recipient: Did,
}

/// Who an access rule applies to, relative to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Anyone,
    Author,
    Recipient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub who: Actor,
    pub can: Capability,
}

/// One record type the protocol declares: a name, its schema URI, and the
/// accepted data formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeDef {
    pub name: String,
    pub schema: String,
    pub data_formats: Vec<String>,
}

/// Structural rule binding access rules to a declared record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRule {
    pub record_type: String,
    pub actions: Vec<AccessRule>,
}

/// Declarative protocol install: record types plus structural access rules.
/// Lifecycle is create-if-absent; the core never updates or removes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    pub protocol: String,
    pub published: bool,
    pub types: Vec<RecordTypeDef>,
    pub structure: Vec<StructureRule>,
}

/// A registration as the store reports it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRegistration {
    pub definition: ProtocolDescriptor,
    pub registered_at: i64,
}

/// Handle to a stored record. Body resolution may fail per record and must
/// not take the rest of a result set down with it.
#[async_trait]
pub trait RecordHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Decode the record body as JSON.
    async fn resolve_json(&self) -> Result<serde_json::Value, StoreStatus>;
}

/// The store operations the core depends on. Everything here is a remote
/// call; callers are expected to bound each one with a timeout.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query(&self, filter: &QueryFilter) -> (Vec<Arc<dyn RecordHandle>>, StoreStatus);

    async fn write(
        &self,
        body: &serde_json::Value,
        routing: &WriteRouting,
    ) -> (Option<Arc<dyn RecordHandle>>, StoreStatus);

    async fn query_protocols(&self, protocol_uri: &str) -> (Vec<ProtocolRegistration>, StoreStatus);

    async fn configure_protocol(
        &self,
        definition: &ProtocolDescriptor,
    ) -> (Option<ProtocolRegistration>, StoreStatus);

    /// Forward an already-written record to `to`'s node.
    async fn send(&self, record_id: &str, to: &Did) -> StoreStatus;

    /// Propagate a protocol registration to `to`'s node.
    async fn send_protocol(&self, definition: &ProtocolDescriptor, to: &Did) -> StoreStatus;
}

/// A connected identity: the store handle plus the caller-owned identifier.
/// Owned by the caller and passed into every operation; no process-wide
/// client state.
#[derive(Clone)]
pub struct Session {
    pub store: Arc<dyn RecordStore>,
    pub did: Did,
}

/// Produces a connected session. Key generation and agent wiring live behind
/// this boundary; failure here is fatal to the whole client.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn connect(&self) -> Result<Session, ConnectError>;
}
