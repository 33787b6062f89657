use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::types::Did;
use crate::error::ConnectError;
use crate::store::{
    IdentityProvider, ProtocolDescriptor, ProtocolRegistration, QueryFilter, RecordHandle,
    RecordStore, Session, SortOrder, StoreStatus, WriteRouting,
};

/// In-process network of per-identity store nodes. `send` hops a record from
/// the writer's node into the recipient's node, which is all the "remote"
/// this store has. One instance is shared by every participant in a test.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    nodes: Mutex<HashMap<Did, NodeState>>,
    // Store-managed creation counter; drives query sort order.
    created_seq: AtomicI64,
}

#[derive(Default)]
struct NodeState {
    records: Vec<StoredRecord>,
    protocols: Vec<ProtocolRegistration>,
    faults: Faults,
}

#[derive(Clone)]
struct StoredRecord {
    id: String,
    body: serde_json::Value,
    protocol: String,
    schema: String,
    recipient: Did,
    date_created: i64,
    poisoned: bool,
}

/// One-shot fault switches, consumed by the next matching call.
#[derive(Default)]
struct Faults {
    next_query: bool,
    next_write: bool,
    next_send: bool,
    next_protocol_query: bool,
    next_configure: bool,
    next_protocol_send: bool,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                nodes: Mutex::new(HashMap::new()),
                created_seq: AtomicI64::new(0),
            }),
        }
    }

    /// Store handle scoped to one identity's node.
    pub fn store_for(&self, did: &Did) -> Arc<MemoryStore> {
        Arc::new(MemoryStore {
            network: self.clone(),
            owner: did.clone(),
        })
    }

    /// Identity provider handing out sessions backed by this network.
    pub fn identity(&self, did: impl Into<Did>) -> MemoryIdentity {
        MemoryIdentity {
            network: self.clone(),
            did: did.into(),
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-identity view of a [`MemoryNetwork`]. Cheap to clone; all state lives
/// in the shared network so every handle for the same identity sees the same
/// node (including injected faults).
pub struct MemoryStore {
    network: MemoryNetwork,
    owner: Did,
}

impl MemoryStore {
    pub async fn fail_next_query(&self) {
        self.with_faults(|f| f.next_query = true).await;
    }

    pub async fn fail_next_write(&self) {
        self.with_faults(|f| f.next_write = true).await;
    }

    pub async fn fail_next_send(&self) {
        self.with_faults(|f| f.next_send = true).await;
    }

    pub async fn fail_next_protocol_query(&self) {
        self.with_faults(|f| f.next_protocol_query = true).await;
    }

    pub async fn fail_next_configure(&self) {
        self.with_faults(|f| f.next_configure = true).await;
    }

    pub async fn fail_next_protocol_send(&self) {
        self.with_faults(|f| f.next_protocol_send = true).await;
    }

    /// Mark one of the owner's records so its body no longer resolves.
    /// Returns false when no record with that id exists.
    pub async fn poison_record(&self, record_id: &str) -> bool {
        let mut nodes = self.network.inner.nodes.lock().await;
        let node = nodes.entry(self.owner.clone()).or_default();
        match node.records.iter_mut().find(|record| record.id == record_id) {
            Some(record) => {
                record.poisoned = true;
                true
            }
            None => false,
        }
    }

    async fn with_faults(&self, apply: impl FnOnce(&mut Faults)) {
        let mut nodes = self.network.inner.nodes.lock().await;
        apply(&mut nodes.entry(self.owner.clone()).or_default().faults);
    }

    async fn take_fault(&self, pick: fn(&mut Faults) -> &mut bool) -> bool {
        let mut nodes = self.network.inner.nodes.lock().await;
        let flag = pick(&mut nodes.entry(self.owner.clone()).or_default().faults);
        std::mem::take(flag)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(&self, filter: &QueryFilter) -> (Vec<Arc<dyn RecordHandle>>, StoreStatus) {
        if self.take_fault(|f| &mut f.next_query).await {
            return (Vec::new(), StoreStatus::failure(500, "injected query failure"));
        }

        let mut nodes = self.network.inner.nodes.lock().await;
        let node = nodes.entry(self.owner.clone()).or_default();

        let mut matches: Vec<StoredRecord> = node
            .records
            .iter()
            .filter(|record| record.protocol == filter.protocol)
            .filter(|record| {
                filter
                    .schema
                    .as_ref()
                    .is_none_or(|schema| record.schema == *schema)
            })
            .filter(|record| {
                filter
                    .recipient
                    .as_ref()
                    .is_none_or(|recipient| record.recipient == *recipient)
            })
            .cloned()
            .collect();

        match filter.sort.unwrap_or(SortOrder::CreatedAscending) {
            SortOrder::CreatedAscending => matches.sort_by_key(|record| record.date_created),
            SortOrder::CreatedDescending => {
                matches.sort_by_key(|record| std::cmp::Reverse(record.date_created))
            }
        }

        let handles = matches
            .into_iter()
            .map(|record| Arc::new(MemoryRecord { record }) as Arc<dyn RecordHandle>)
            .collect();

        (handles, StoreStatus::ok())
    }

    async fn write(
        &self,
        body: &serde_json::Value,
        routing: &WriteRouting,
    ) -> (Option<Arc<dyn RecordHandle>>, StoreStatus) {
        if self.take_fault(|f| &mut f.next_write).await {
            return (None, StoreStatus::failure(500, "injected write failure"));
        }

        let record = StoredRecord {
            id: Uuid::new_v4().to_string(),
            body: body.clone(),
            protocol: routing.protocol.clone(),
            schema: routing.schema.clone(),
            recipient: routing.recipient.clone(),
            date_created: self.network.inner.created_seq.fetch_add(1, Ordering::SeqCst),
            poisoned: false,
        };

        let mut nodes = self.network.inner.nodes.lock().await;
        let node = nodes.entry(self.owner.clone()).or_default();
        node.records.push(record.clone());

        (
            Some(Arc::new(MemoryRecord { record }) as Arc<dyn RecordHandle>),
            StoreStatus::accepted(),
        )
    }

    async fn query_protocols(&self, protocol_uri: &str) -> (Vec<ProtocolRegistration>, StoreStatus) {
        if self.take_fault(|f| &mut f.next_protocol_query).await {
            return (
                Vec::new(),
                StoreStatus::failure(500, "injected protocol query failure"),
            );
        }

        let mut nodes = self.network.inner.nodes.lock().await;
        let node = nodes.entry(self.owner.clone()).or_default();
        let matches = node
            .protocols
            .iter()
            .filter(|registration| registration.definition.protocol == protocol_uri)
            .cloned()
            .collect();

        (matches, StoreStatus::ok())
    }

    async fn configure_protocol(
        &self,
        definition: &ProtocolDescriptor,
    ) -> (Option<ProtocolRegistration>, StoreStatus) {
        if self.take_fault(|f| &mut f.next_configure).await {
            return (None, StoreStatus::failure(500, "injected configure failure"));
        }

        let registration = ProtocolRegistration {
            definition: definition.clone(),
            registered_at: self.network.inner.created_seq.fetch_add(1, Ordering::SeqCst),
        };

        let mut nodes = self.network.inner.nodes.lock().await;
        let node = nodes.entry(self.owner.clone()).or_default();
        // Configure replaces any registration for the same protocol URI, so
        // at most one exists per node.
        node.protocols
            .retain(|existing| existing.definition.protocol != definition.protocol);
        node.protocols.push(registration.clone());

        (Some(registration), StoreStatus::accepted())
    }

    async fn send(&self, record_id: &str, to: &Did) -> StoreStatus {
        if self.take_fault(|f| &mut f.next_send).await {
            return StoreStatus::failure(500, "injected send failure");
        }

        let mut nodes = self.network.inner.nodes.lock().await;
        let record = match nodes
            .entry(self.owner.clone())
            .or_default()
            .records
            .iter()
            .find(|record| record.id == record_id)
        {
            Some(record) => record.clone(),
            None => return StoreStatus::failure(404, "record not found"),
        };

        let target = nodes.entry(to.clone()).or_default();
        // Re-sending the same record replaces the copy rather than duplicating it.
        target.records.retain(|existing| existing.id != record.id);
        target.records.push(record);

        StoreStatus::accepted()
    }

    async fn send_protocol(&self, definition: &ProtocolDescriptor, to: &Did) -> StoreStatus {
        if self.take_fault(|f| &mut f.next_protocol_send).await {
            return StoreStatus::failure(500, "injected protocol send failure");
        }

        let registration = ProtocolRegistration {
            definition: definition.clone(),
            registered_at: self.network.inner.created_seq.fetch_add(1, Ordering::SeqCst),
        };

        let mut nodes = self.network.inner.nodes.lock().await;
        let target = nodes.entry(to.clone()).or_default();
        target
            .protocols
            .retain(|existing| existing.definition.protocol != definition.protocol);
        target.protocols.push(registration);

        StoreStatus::accepted()
    }
}

struct MemoryRecord {
    record: StoredRecord,
}

#[async_trait]
impl RecordHandle for MemoryRecord {
    fn id(&self) -> &str {
        &self.record.id
    }

    async fn resolve_json(&self) -> Result<serde_json::Value, StoreStatus> {
        if self.record.poisoned {
            return Err(StoreStatus::failure(400, "record body is not valid JSON"));
        }
        Ok(self.record.body.clone())
    }
}

/// Identity provider backed by a [`MemoryNetwork`]. No key material exists
/// here; the identifier is taken as given.
pub struct MemoryIdentity {
    network: MemoryNetwork,
    did: Did,
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn connect(&self) -> Result<Session, ConnectError> {
        Ok(Session {
            store: self.network.store_for(&self.did),
            did: self.did.clone(),
        })
    }
}
