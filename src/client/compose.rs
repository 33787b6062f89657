use chrono::Local;
use tokio::time::timeout;

use crate::common::types::{Did, Ding, SendStatus};
use crate::config::AppConfig;
use crate::error::SendError;
use crate::store::{RecordStore, StoreStatus, WriteRouting};

/// Build a ding authored by `self_did`. The timestamp is a local-clock
/// display string; the store's creation order is what sorting uses.
pub fn construct_ding(self_did: &Did, recipient: &Did, note: &str) -> Ding {
    Ding {
        sender: self_did.clone(),
        recipient: recipient.clone(),
        note: note.to_string(),
        timestamp_written: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// Write a ding to the local node, then forward it to the recipient's node.
///
/// The two steps fail independently: a failed write means nothing exists
/// anywhere (`WriteFailed`); a failed forward leaves the record written
/// locally with no compensating delete (`ForwardFailed`, carrying the record
/// id). The caller is expected to reconcile afterwards in either written
/// case so the new ding shows up without waiting for the next tick.
pub async fn compose_and_send(
    store: &dyn RecordStore,
    self_did: &Did,
    recipient: &Did,
    note: &str,
    config: &AppConfig,
) -> Result<SendStatus, SendError> {
    let ding = construct_ding(self_did, recipient, note);
    let body = serde_json::to_value(&ding).map_err(|err| {
        SendError::WriteFailed(StoreStatus::failure(
            500,
            format!("failed to encode ding: {err}"),
        ))
    })?;

    let routing = WriteRouting {
        protocol: config.protocol_uri.clone(),
        protocol_path: "ding".to_string(),
        schema: config.schema_uri.clone(),
        recipient: recipient.clone(),
    };

    let (record, status) = timeout(config.call_timeout(), store.write(&body, &routing))
        .await
        .map_err(|_| SendError::Timeout(config.call_timeout_secs))?;

    if !status.is_success() {
        return Err(SendError::WriteFailed(status));
    }
    let Some(record) = record else {
        return Err(SendError::WriteFailed(StoreStatus::failure(
            500,
            "write returned no record handle",
        )));
    };
    let record_id = record.id().to_string();

    let forward_status = match timeout(config.call_timeout(), store.send(&record_id, recipient)).await
    {
        Ok(status) => status,
        // The write already landed, so a hung forward is a forward failure,
        // not a lost ding.
        Err(_) => StoreStatus::failure(
            408,
            format!("send timed out after {}s", config.call_timeout_secs),
        ),
    };

    if !forward_status.is_success() {
        return Err(SendError::ForwardFailed {
            record_id,
            status: forward_status,
        });
    }

    log::info!("Ding {record_id} sent to {recipient}");
    Ok(SendStatus { record_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sync::reconcile;
    use crate::store::memory::MemoryNetwork;

    #[tokio::test]
    async fn successful_compose_writes_and_forwards() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let config = AppConfig::default();
        let alice_store = network.store_for(&alice);
        let bob_store = network.store_for(&bob);

        let status = compose_and_send(alice_store.as_ref(), &alice, &bob, "hello", &config)
            .await
            .unwrap();
        assert!(!status.record_id.is_empty());

        let view = reconcile(bob_store.as_ref(), &bob, &config).await.unwrap();
        assert_eq!(view.received.len(), 1);
        assert_eq!(view.received[0].note, "hello");
        assert_eq!(view.received[0].sender, alice);
    }

    #[tokio::test]
    async fn write_failure_means_nothing_was_written() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let config = AppConfig::default();
        let store = network.store_for(&alice);

        store.fail_next_write().await;
        let result = compose_and_send(store.as_ref(), &alice, &bob, "hello", &config).await;
        assert!(matches!(result, Err(SendError::WriteFailed(_))));

        let view = reconcile(store.as_ref(), &alice, &config).await.unwrap();
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn forward_failure_leaves_the_record_written() {
        let network = MemoryNetwork::new();
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let config = AppConfig::default();
        let alice_store = network.store_for(&alice);
        let bob_store = network.store_for(&bob);

        alice_store.fail_next_send().await;
        let result = compose_and_send(alice_store.as_ref(), &alice, &bob, "hello", &config).await;
        let record_id = match result {
            Err(SendError::ForwardFailed { record_id, .. }) => record_id,
            other => panic!("expected ForwardFailed, got {other:?}"),
        };

        // Still visible to the sender on the next reconciliation.
        let view = reconcile(alice_store.as_ref(), &alice, &config)
            .await
            .unwrap();
        assert_eq!(view.sent.len(), 1);
        assert_eq!(view.sent[0].note, "hello");
        assert!(!record_id.is_empty());

        // The recipient never got a copy.
        let view = reconcile(bob_store.as_ref(), &bob, &config).await.unwrap();
        assert!(view.received.is_empty());
    }

    #[test]
    fn constructed_ding_carries_the_caller_identity() {
        let alice = Did::from("did:ex:alice");
        let bob = Did::from("did:ex:bob");
        let ding = construct_ding(&alice, &bob, "hi");
        assert_eq!(ding.sender, alice);
        assert_eq!(ding.recipient, bob);
        assert_eq!(ding.note, "hi");
        assert!(!ding.timestamp_written.is_empty());
    }
}
