//! Session lifecycle for every instance served by this process.
//!
//! The [`Gateway`] owns one protocol client per instance id and is the only
//! place clients are created, replaced or dropped. Pairing runs in a
//! background observer task per instance; callers of [`Gateway::connect`] only
//! poll the QR cache that observer fills.

mod bootstrap;
mod emitter;
mod guard;
mod identity;
mod observer;


pub use bootstrap::GatewayBuilder;
pub use emitter::{EventSink, LogSink, WebhookPayload};
pub use observer::PairingOutcome;

use crate::client::{ClientFactory, ProtocolClient};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::repository::InstanceRepository;
use crate::storage::FileStorage;
use crate::store::DeviceContainer;
use crate::types::events::EventHandler;
use crate::types::instance::{Instance, InstanceProxy};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use guard::{ObserverGuard, ObserverSet};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

static INSTANCE: OnceCell<Arc<Gateway>> = OnceCell::const_new();

/// The process-wide gateway, once [`GatewayBuilder::load_global`] has run.
pub fn get() -> Option<Arc<Gateway>> {
    INSTANCE.get().cloned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Closed,
    Connecting,
    #[serde(rename = "qrcode")]
    QrCode,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::QrCode => "qrcode",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}

pub struct Gateway {
    clients: DashMap<String, Arc<dyn ProtocolClient>>,
    qr_cache: Arc<DashMap<String, String>>,
    observers: ObserverSet,
    instance_cache: DashMap<String, Instance>,
    container: Arc<dyn DeviceContainer>,
    factory: Arc<dyn ClientFactory>,
    repo: Arc<dyn InstanceRepository>,
    file_storage: Option<Arc<dyn FileStorage>>,
    emitter: emitter::Emitter,
    config: GatewayConfig,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn file_storage(&self) -> Option<Arc<dyn FileStorage>> {
        self.file_storage.clone()
    }

    /// The client registered for `id`, if any.
    pub fn client(&self, id: &str) -> Option<Arc<dyn ProtocolClient>> {
        self.clients.get(id).map(|c| c.value().clone())
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    /// Starts pairing for `id` and returns the current QR code.
    ///
    /// An empty string means either the instance is already logged in or no
    /// code showed up within the wait window; neither is an error.
    pub async fn connect(self: &Arc<Self>, id: &str) -> Result<String> {
        let client = self
            .clients
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(target: "Gateway", "Creating new client for {id}");
                self.factory.new_client(self.container.new_device())
            })
            .value()
            .clone();

        if client.is_logged_in() {
            return Ok(String::new());
        }

        // A running observer owns the client, identity included, until it exits.
        let Some(guard) = self.observers.try_acquire(id) else {
            debug!(target: "Gateway", "Observer connection already running for {id}");
            return Ok(self.wait_for_qr_code(id).await);
        };

        let client = if client.device().id.is_some() {
            self.replace_stale_client(id, client).await
        } else {
            client
        };

        self.start_observer(id, client, guard).await?;
        Ok(self.wait_for_qr_code(id).await)
    }

    /// Projects the registry, the QR cache and the client flags into one state.
    pub fn status(&self, id: &str) -> ConnectionStatus {
        let Some(client) = self.client(id) else {
            return ConnectionStatus::Closed;
        };

        let connected = client.is_connected();
        let logged_in = client.is_logged_in();

        if connected && logged_in {
            return ConnectionStatus::Connected;
        }
        if connected && self.qr_cache.contains_key(id) {
            return ConnectionStatus::QrCode;
        }
        if logged_in {
            return ConnectionStatus::Connecting;
        }
        ConnectionStatus::Closed
    }

    pub async fn logout(&self, id: &str) -> Result<()> {
        let Some(client) = self.client(id) else {
            warn!(target: "Gateway", "logout: client for {id} does not exist");
            return Ok(());
        };

        client.logout().await?;
        Ok(())
    }

    /// Drops the session for `id`, including its persisted device.
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        let Some((_, client)) = self.clients.remove(id) else {
            warn!(target: "Gateway", "Failed to disconnect {id} (device not loaded)");
            return Ok(());
        };

        client.disconnect().await;
        if let Err(e) = self.container.delete_device(&client.device()).await {
            error!(target: "Gateway", "Failed to delete device for {id}: {e}");
        }
        self.qr_cache.remove(id);
        Ok(())
    }

    /// Forgets the cached record for `id` so the next lookup hits the repository.
    pub fn invalidate_instance(&self, id: &str) {
        self.instance_cache.remove(id);
    }

    /// Events dropped because the dispatch queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.emitter.dropped()
    }

    /// The handler to register on a client so its events reach the dispatcher.
    pub fn event_handler(&self, id: &str) -> Arc<dyn EventHandler> {
        self.emitter.handler(id)
    }

    fn cached_qr_code(&self, id: &str) -> Option<String> {
        self.qr_cache
            .get(id)
            .map(|c| c.value().clone())
            .filter(|c| !c.is_empty())
    }

    /// Tears down a client that holds an identity it can no longer log in with,
    /// and registers a fresh one in its place. Only called with the observer
    /// slot for `id` held.
    async fn replace_stale_client(
        &self,
        id: &str,
        stale: Arc<dyn ProtocolClient>,
    ) -> Arc<dyn ProtocolClient> {
        debug!(
            target: "Gateway",
            "Client for {id} has stale identity {:?}, replacing it",
            stale.device().id
        );
        teardown_client(self.container.as_ref(), stale.as_ref()).await;

        match self.clients.entry(id.to_string()) {
            Entry::Occupied(entry) if !Arc::ptr_eq(entry.get(), &stale) => {
                // another caller already swapped it
                entry.get().clone()
            }
            Entry::Occupied(mut entry) => {
                let fresh = self.factory.new_client(self.container.new_device());
                entry.insert(fresh.clone());
                fresh
            }
            Entry::Vacant(slot) => {
                let fresh = self.factory.new_client(self.container.new_device());
                slot.insert(fresh.clone());
                fresh
            }
        }
    }

    /// Opens the QR channel and hands it to a background observer that owns `guard`.
    async fn start_observer(
        self: &Arc<Self>,
        id: &str,
        client: Arc<dyn ProtocolClient>,
        guard: ObserverGuard,
    ) -> Result<()> {
        debug!(target: "Gateway", "Starting observer connection for {id}");
        let deadline = Instant::now() + self.config.pairing_window();
        let qr_rx = client.get_qr_channel().await?;
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            gateway
                .observe_connection(client, qr_rx, deadline, guard)
                .await;
        });
        Ok(())
    }

    /// Polls the QR cache for up to `qr_wait_timeout`. Empty when nothing shows up.
    async fn wait_for_qr_code(&self, id: &str) -> String {
        if let Some(code) = self.cached_qr_code(id) {
            return code;
        }

        let period = self.config.qr_poll_interval();
        let poll = async {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(code) = self.cached_qr_code(id) {
                    debug!(target: "Gateway", "Got qr code from cache for {id}");
                    return code;
                }
            }
        };

        match timeout(self.config.qr_wait_timeout(), poll).await {
            Ok(code) => code,
            Err(_) => {
                debug!(target: "Gateway", "No qr code for {id} within the wait window");
                String::new()
            }
        }
    }

    /// Read-through lookup of the instance record. Falls back to a bare record
    /// so a repository hiccup never blocks pairing.
    async fn get_instance_cached(&self, id: &str) -> Instance {
        if let Some(instance) = self.instance_cache.get(id) {
            return instance.value().clone();
        }

        match self.repo.get(id).await {
            Ok(Some(instance)) => {
                self.instance_cache.insert(id.to_string(), instance.clone());
                instance
            }
            Ok(None) => {
                warn!(target: "Gateway", "Instance {id} not found in repository");
                Instance::new(id)
            }
            Err(e) => {
                error!(target: "Gateway", "Failed to load instance {id}: {e}");
                Instance::new(id)
            }
        }
    }
}

pub(crate) fn configure_proxy(client: &dyn ProtocolClient, proxy: &InstanceProxy) {
    match proxy.to_url() {
        Some(url) => {
            debug!(target: "Gateway", "Using proxy {}:{}", proxy.proxy_host, proxy.proxy_port);
            client.set_proxy(Some(&url));
        }
        None => client.set_proxy(None),
    }
}

/// Best-effort logout, disconnect and device deletion. Failures are logged only.
pub(crate) async fn teardown_client(container: &dyn DeviceContainer, client: &dyn ProtocolClient) {
    let device = client.device();
    if let Err(e) = client.logout().await {
        debug!(target: "Gateway", "Failed to logout {:?}: {e}", device.id);
    }
    client.disconnect().await;
    if let Err(e) = container.delete_device(&device).await {
        error!(target: "Gateway", "Failed to delete device {:?}: {e}", device.id);
    } else {
        info!(target: "Gateway", "Discarded device {:?}", device.id);
    }
}
