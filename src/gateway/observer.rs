use super::guard::ObserverGuard;
use super::{Gateway, configure_proxy, teardown_client};
use crate::client::ProtocolClient;
use crate::qrcode::QrCodeEvent;
use crate::types::instance::InstanceUpdate;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// How a pairing observation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired,
    /// The pairing window elapsed; the session was discarded.
    Expired,
    ChannelClosed,
    /// Connecting failed, or the client ended pairing without success.
    Failed,
}

impl Gateway {
    /// Drives one instance's QR channel until pairing succeeds, the window
    /// closes, or the channel goes away. Dropping `guard` on return clears the
    /// running flag and the cached code.
    pub(super) async fn observe_connection(
        self: Arc<Self>,
        client: Arc<dyn ProtocolClient>,
        mut qr_rx: mpsc::Receiver<QrCodeEvent>,
        deadline: Instant,
        guard: ObserverGuard,
    ) -> PairingOutcome {
        let id = guard.id().to_string();
        debug!(target: "Gateway/Observer", "Starting observer connection for {id}");

        let outcome = self
            .drive_pairing(&id, client.as_ref(), &mut qr_rx, deadline)
            .await;

        if outcome == PairingOutcome::Expired {
            teardown_client(self.container.as_ref(), client.as_ref()).await;
            self.clients
                .remove_if(&id, |_, registered| Arc::ptr_eq(registered, &client));
            info!(target: "Gateway/Observer", "QR code window for {id} is done, session discarded");
        }

        debug!(target: "Gateway/Observer", "Stopping observer connection for {id}: {outcome:?}");
        drop(guard);
        outcome
    }

    async fn drive_pairing(
        &self,
        id: &str,
        client: &dyn ProtocolClient,
        qr_rx: &mut mpsc::Receiver<QrCodeEvent>,
        deadline: Instant,
    ) -> PairingOutcome {
        if !client.is_connected() {
            debug!(target: "Gateway/Observer", "Client {id} is not connected, connecting");
            let instance = self.get_instance_cached(id).await;
            configure_proxy(client, &instance.proxy);
            if let Err(e) = client.connect().await {
                error!(target: "Gateway/Observer", "Failed to connect {id}: {e}");
                return PairingOutcome::Failed;
            }
        }

        debug!(target: "Gateway/Observer", "Waiting for QR channel event for {id}");
        let window = sleep_until(deadline);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => return PairingOutcome::Expired,
                evt = qr_rx.recv() => {
                    let Some(evt) = evt else {
                        debug!(target: "Gateway/Observer", "QR channel closed for {id}");
                        return PairingOutcome::ChannelClosed;
                    };
                    debug!(target: "Gateway/Observer", "Received QR channel event {} for {id}", evt.name());
                    match evt {
                        QrCodeEvent::Code { code, .. } => {
                            self.qr_cache.insert(id.to_string(), code);
                        }
                        QrCodeEvent::Success => return self.finish_pairing(id, client).await,
                        other if other.is_terminal() => {
                            warn!(target: "Gateway/Observer", "Pairing for {id} ended with {}", other.name());
                            return PairingOutcome::Failed;
                        }
                        other => {
                            warn!(target: "Gateway/Observer", "Pairing for {id} reported {}, still waiting", other.name());
                        }
                    }
                }
            }
        }
    }

    async fn finish_pairing(&self, id: &str, client: &dyn ProtocolClient) -> PairingOutcome {
        info!(target: "Gateway/Observer", "Device {id} connected successfully");

        let Some(jid) = client.device().id else {
            error!(target: "Gateway/Observer", "JID is empty after login for {id}");
            return PairingOutcome::Failed;
        };

        client.remove_event_handlers();
        client.add_event_handler(self.event_handler(id));

        match self
            .repo
            .update(id, InstanceUpdate::remote_jid(jid.to_string()))
            .await
        {
            Ok(instance) => {
                self.instance_cache.insert(id.to_string(), instance);
            }
            Err(e) => {
                error!(target: "Gateway/Observer", "Failed to update instance {id} after login: {e}");
                self.invalidate_instance(id);
            }
        }

        PairingOutcome::Paired
    }
}
