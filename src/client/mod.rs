pub mod compose;
pub mod install;
pub mod sync;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::common::types::{ClassifiedView, Did};
use crate::common::{ClientCommand, ClientEvent};
use crate::config::AppConfig;
use crate::error::{ConnectError, InstallError, SendError};
use crate::store::{IdentityProvider, Session};

pub use compose::compose_and_send;
pub use install::{InstallOutcome, ensure_protocol_installed};
pub use sync::reconcile;

/// Long-running client task. Owns the session and the classified view,
/// serializes reconciliations by running them inline in its single select
/// loop, and publishes every completed view wholesale on the event channel.
pub struct DingClient {
    session: Session,
    config: AppConfig,
    event_sender: mpsc::Sender<ClientEvent>,
    command_receiver: mpsc::Receiver<ClientCommand>,
    // Last successful view; kept as-is across failed reconciliations.
    view: ClassifiedView,
}

impl DingClient {
    pub fn new(
        session: Session,
        config: AppConfig,
        event_sender: mpsc::Sender<ClientEvent>,
        command_receiver: mpsc::Receiver<ClientCommand>,
    ) -> Self {
        Self {
            session,
            config,
            event_sender,
            command_receiver,
            view: ClassifiedView::default(),
        }
    }

    /// Install the protocol, reconcile once, then poll on a fixed period
    /// until `Shutdown` arrives or the command channel closes. The poll
    /// timer lives inside this loop, so tearing the task down tears the
    /// timer down with it.
    pub async fn run(mut self) -> Result<(), InstallError> {
        let outcome = install::ensure_protocol_installed(
            self.session.store.as_ref(),
            &self.session.did,
            &self.config,
        )
        .await?;
        log::info!("Protocol setup complete ({outcome:?}) for {}", self.session.did);

        self.refresh_view().await;

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // An interval's first tick completes immediately; the startup
        // reconciliation above already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(ClientCommand::Compose { recipient, note }) => {
                            self.handle_compose(recipient, note).await;
                        }
                        Some(ClientCommand::Refresh) => {
                            self.refresh_view().await;
                        }
                        Some(ClientCommand::Shutdown) | None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.refresh_view().await;
                }
            }
        }

        log::info!("Ding client for {} stopped", self.session.did);
        Ok(())
    }

    async fn handle_compose(&mut self, recipient: Did, note: String) {
        match compose::compose_and_send(
            self.session.store.as_ref(),
            &self.session.did,
            &recipient,
            &note,
            &self.config,
        )
        .await
        {
            Ok(status) => {
                self.emit(ClientEvent::Sent(status)).await;
                // Show the new ding without waiting for the next tick.
                self.refresh_view().await;
            }
            Err(SendError::ForwardFailed { record_id, status }) => {
                log::warn!("Ding {record_id} written but not forwarded: {status}");
                self.emit(ClientEvent::SendIncomplete {
                    record_id,
                    reason: status.to_string(),
                })
                .await;
                // The record was written, so it still belongs in the view.
                self.refresh_view().await;
            }
            Err(err) => {
                log::error!("Compose failed: {err}");
                self.emit(ClientEvent::SendFailed(err)).await;
            }
        }
    }

    async fn refresh_view(&mut self) {
        match sync::reconcile(self.session.store.as_ref(), &self.session.did, &self.config).await {
            Ok(view) => {
                self.view = view.clone();
                self.emit(ClientEvent::ViewUpdated(view)).await;
            }
            Err(err) => {
                log::warn!(
                    "Reconciliation failed ({err}); keeping previous view with {} sent / {} received",
                    self.view.sent.len(),
                    self.view.received.len()
                );
                self.emit(ClientEvent::SyncFailed(err)).await;
            }
        }
    }

    async fn emit(&self, event: ClientEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to emit client event: {err}");
        }
    }
}

/// Connect an identity and spawn its client task, returning the channel pair
/// a frontend drives it with. Connection failure is fatal: there is no
/// degraded mode without an identity.
pub async fn spawn_client(
    provider: &dyn IdentityProvider,
    config: AppConfig,
) -> Result<
    (
        mpsc::Sender<ClientCommand>,
        mpsc::Receiver<ClientEvent>,
        JoinHandle<Result<(), InstallError>>,
    ),
    ConnectError,
> {
    let session = provider.connect().await?;
    log::info!("Connected as {}", session.did);

    // Frontend -> client
    let (command_sender, command_receiver) = mpsc::channel(100);
    // Client -> frontend
    let (event_sender, event_receiver) = mpsc::channel(100);

    let client = DingClient::new(session, config, event_sender, command_receiver);
    let handle = tokio::spawn(client.run());

    Ok((command_sender, event_receiver, handle))
}
