use tokio::time::timeout;

use crate::common::types::Did;
use crate::config::AppConfig;
use crate::error::InstallError;
use crate::store::{
    AccessRule, Actor, Capability, ProtocolDescriptor, RecordStore, RecordTypeDef, StructureRule,
};

/// How an install attempt concluded. Every variant lets the client proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The store already holds a registration; no configure call was issued.
    AlreadyInstalled,
    Installed,
    /// Configured locally, but propagation to the identity's remote node
    /// failed. Reported once, never retried.
    InstalledLocalOnly,
}

/// Descriptor for the shared ding protocol: one `ding` record type, JSON
/// bodies, anyone may write, author and declared recipient may read.
pub fn ding_protocol_definition(config: &AppConfig) -> ProtocolDescriptor {
    ProtocolDescriptor {
        protocol: config.protocol_uri.clone(),
        published: true,
        types: vec![RecordTypeDef {
            name: "ding".to_string(),
            schema: config.schema_uri.clone(),
            data_formats: vec!["application/json".to_string()],
        }],
        structure: vec![StructureRule {
            record_type: "ding".to_string(),
            actions: vec![
                AccessRule {
                    who: Actor::Anyone,
                    can: Capability::Write,
                },
                AccessRule {
                    who: Actor::Author,
                    can: Capability::Read,
                },
                AccessRule {
                    who: Actor::Recipient,
                    can: Capability::Read,
                },
            ],
        }],
    }
}

/// Ensure the ding protocol is registered for this identity, installing it
/// if absent. Safe to call repeatedly: the store itself is the source of
/// truth for "already installed", never local memory, because the same
/// identity may be set up again from a fresh process.
pub async fn ensure_protocol_installed(
    store: &dyn RecordStore,
    self_did: &Did,
    config: &AppConfig,
) -> Result<InstallOutcome, InstallError> {
    let call_timeout = config.call_timeout();

    let (registrations, status) = timeout(call_timeout, store.query_protocols(&config.protocol_uri))
        .await
        .map_err(|_| InstallError::Timeout(config.call_timeout_secs))?;

    if !status.is_success() {
        // Fail closed: a failed query says nothing about absence.
        return Err(InstallError::QueryFailed(status));
    }

    if !registrations.is_empty() {
        log::debug!(
            "Protocol {} already installed for {self_did}",
            config.protocol_uri
        );
        return Ok(InstallOutcome::AlreadyInstalled);
    }

    let definition = ding_protocol_definition(config);
    let (_registration, status) = timeout(call_timeout, store.configure_protocol(&definition))
        .await
        .map_err(|_| InstallError::Timeout(config.call_timeout_secs))?;

    if !status.is_success() {
        return Err(InstallError::ConfigureFailed(status));
    }
    log::info!("Installed protocol {} locally for {self_did}", config.protocol_uri);

    // Propagate the registration to this identity's own remote node. Failure
    // here is non-fatal and only reported.
    match timeout(call_timeout, store.send_protocol(&definition, self_did)).await {
        Ok(status) if status.is_success() => Ok(InstallOutcome::Installed),
        Ok(status) => {
            log::warn!("Protocol installed locally but remote publish failed: {status}");
            Ok(InstallOutcome::InstalledLocalOnly)
        }
        Err(_) => {
            log::warn!(
                "Protocol installed locally but remote publish timed out after {}s",
                config.call_timeout_secs
            );
            Ok(InstallOutcome::InstalledLocalOnly)
        }
    }
}
