use futures::future::join_all;
use tokio::time::timeout;

use crate::common::types::{ClassifiedView, Did, Ding};
use crate::config::AppConfig;
use crate::error::SyncError;
use crate::store::{QueryFilter, RecordStore, SortOrder};

/// One full query-and-classify cycle: fetch every record under the ding
/// protocol in creation order, resolve bodies, and partition into the
/// sent/received view relative to `self_did`.
///
/// Stateless across calls. On `Err` the caller keeps its previous view; a
/// transient failure must never blank what the user already sees.
pub async fn reconcile(
    store: &dyn RecordStore,
    self_did: &Did,
    config: &AppConfig,
) -> Result<ClassifiedView, SyncError> {
    let filter = QueryFilter {
        protocol: config.protocol_uri.clone(),
        schema: Some(config.schema_uri.clone()),
        recipient: None,
        sort: Some(SortOrder::CreatedAscending),
    };

    let (records, status) = timeout(config.call_timeout(), store.query(&filter))
        .await
        .map_err(|_| SyncError::Timeout(config.call_timeout_secs))?;

    if !status.is_success() {
        return Err(SyncError::QueryFailed(status));
    }

    let bodies = join_all(records.iter().map(|record| record.resolve_json())).await;

    let mut view = ClassifiedView::default();
    for (record, body) in records.iter().zip(bodies) {
        let value = match body {
            Ok(value) => value,
            Err(status) => {
                // One malformed record must not block visibility of the rest.
                log::warn!("Skipping record {}: body resolution failed: {status}", record.id());
                continue;
            }
        };

        let ding: Ding = match serde_json::from_value(value) {
            Ok(ding) => ding,
            Err(err) => {
                log::warn!("Skipping record {}: malformed ding body: {err}", record.id());
                continue;
            }
        };

        let sent = ding.sender == *self_did;
        let received = ding.recipient == *self_did;
        if sent && received {
            // Self-addressed: shows up in both views.
            view.sent.push(ding.clone());
            view.received.push(ding);
        } else if sent {
            view.sent.push(ding);
        } else if received {
            view.received.push(ding);
        }
        // Authored elsewhere, addressed elsewhere: dropped from both.
    }

    log::debug!(
        "Reconciled {} records into {} sent / {} received for {self_did}",
        records.len(),
        view.sent.len(),
        view.received.len()
    );

    Ok(view)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::future::pending;

    use super::*;
    use crate::store::memory::{MemoryNetwork, MemoryStore};
    use crate::store::{
        ProtocolDescriptor, ProtocolRegistration, RecordHandle, StoreStatus, WriteRouting,
    };

    fn config() -> AppConfig {
        AppConfig::default()
    }

    /// A store whose calls never complete, standing in for a hung node.
    struct HangingStore;

    #[async_trait]
    impl RecordStore for HangingStore {
        async fn query(&self, _filter: &QueryFilter) -> (Vec<Arc<dyn RecordHandle>>, StoreStatus) {
            pending().await
        }

        async fn write(
            &self,
            _body: &serde_json::Value,
            _routing: &WriteRouting,
        ) -> (Option<Arc<dyn RecordHandle>>, StoreStatus) {
            pending().await
        }

        async fn query_protocols(
            &self,
            _protocol_uri: &str,
        ) -> (Vec<ProtocolRegistration>, StoreStatus) {
            pending().await
        }

        async fn configure_protocol(
            &self,
            _definition: &ProtocolDescriptor,
        ) -> (Option<ProtocolRegistration>, StoreStatus) {
            pending().await
        }

        async fn send(&self, _record_id: &str, _to: &Did) -> StoreStatus {
            pending().await
        }

        async fn send_protocol(&self, _definition: &ProtocolDescriptor, _to: &Did) -> StoreStatus {
            pending().await
        }
    }

    async fn write_ding(
        store: &MemoryStore,
        config: &AppConfig,
        sender: &Did,
        recipient: &Did,
        note: &str,
    ) -> String {
        let ding = Ding {
            sender: sender.clone(),
            recipient: recipient.clone(),
            note: note.to_string(),
            timestamp_written: "2026-01-01 12:00:00".to_string(),
        };
        let body = serde_json::to_value(&ding).unwrap();
        let routing = WriteRouting {
            protocol: config.protocol_uri.clone(),
            protocol_path: "ding".to_string(),
            schema: config.schema_uri.clone(),
            recipient: recipient.clone(),
        };
        let (record, status) = store.write(&body, &routing).await;
        assert!(status.is_success());
        record.unwrap().id().to_string()
    }

    #[tokio::test]
    async fn partitions_by_sender_and_recipient() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let carol = Did::from("did:ex:carol");
        let store = network.store_for(&alice);
        let config = config();

        write_ding(&store, &config, &alice, &bob, "to bob").await;
        write_ding(&store, &config, &bob, &alice, "from bob").await;
        // Neither sent by nor addressed to alice: dropped from both views.
        write_ding(&store, &config, &bob, &carol, "not ours").await;

        let view = reconcile(store.as_ref(), &alice, &config).await.unwrap();
        assert_eq!(view.sent.len(), 1);
        assert_eq!(view.sent[0].note, "to bob");
        assert_eq!(view.received.len(), 1);
        assert_eq!(view.received[0].note, "from bob");
    }

    #[tokio::test]
    async fn self_addressed_ding_appears_in_both_views() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let store = network.store_for(&alice);
        let config = config();

        write_ding(&store, &config, &alice, &alice, "note to self").await;

        let view = reconcile(store.as_ref(), &alice, &config).await.unwrap();
        assert_eq!(view.sent.len(), 1);
        assert_eq!(view.received.len(), 1);
        assert_eq!(view.sent[0], view.received[0]);
    }

    #[tokio::test]
    async fn results_keep_creation_order() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let store = network.store_for(&alice);
        let config = config();

        for note in ["one", "two", "three"] {
            write_ding(&store, &config, &alice, &bob, note).await;
        }

        let view = reconcile(store.as_ref(), &alice, &config).await.unwrap();
        let notes: Vec<&str> = view.sent.iter().map(|d| d.note.as_str()).collect();
        assert_eq!(notes, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn one_bad_record_does_not_abort_the_cycle() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let store = network.store_for(&alice);
        let config = config();

        write_ding(&store, &config, &alice, &bob, "good one").await;
        let bad_id = write_ding(&store, &config, &alice, &bob, "bad one").await;
        write_ding(&store, &config, &alice, &bob, "good two").await;
        store.poison_record(&bad_id).await;

        let view = reconcile(store.as_ref(), &alice, &config).await.unwrap();
        let notes: Vec<&str> = view.sent.iter().map(|d| d.note.as_str()).collect();
        assert_eq!(notes, ["good one", "good two"]);
    }

    #[tokio::test]
    async fn record_with_unexpected_shape_is_skipped() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let store = network.store_for(&alice);
        let config = config();

        let routing = WriteRouting {
            protocol: config.protocol_uri.clone(),
            protocol_path: "ding".to_string(),
            schema: config.schema_uri.clone(),
            recipient: bob.clone(),
        };
        let (_, status) = store
            .write(&serde_json::json!({ "unrelated": true }), &routing)
            .await;
        assert!(status.is_success());
        write_ding(&store, &config, &alice, &bob, "well formed").await;

        let view = reconcile(store.as_ref(), &alice, &config).await.unwrap();
        assert_eq!(view.sent.len(), 1);
        assert_eq!(view.sent[0].note, "well formed");
    }

    #[tokio::test]
    async fn total_query_failure_is_an_error() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let store = network.store_for(&alice);
        let config = config();

        store.fail_next_query().await;
        let result = reconcile(store.as_ref(), &alice, &config).await;
        assert!(matches!(result, Err(SyncError::QueryFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_maps_to_a_timeout_error() {
        let alice = Did::from("did:ex:alice");
        let config = config();

        let result = reconcile(&HangingStore, &alice, &config).await;
        match result {
            Err(SyncError::Timeout(secs)) => assert_eq!(secs, config.call_timeout_secs),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
