use super::emitter::{self, EventSink, LogSink};
use super::guard::ObserverSet;
use super::{Gateway, INSTANCE, configure_proxy, teardown_client};
use crate::client::{ClientFactory, ProtocolClient};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::repository::InstanceRepository;
use crate::storage::{FileStorage, LocalFileStorage};
use crate::store::DeviceContainer;
use crate::types::instance::Instance;
use dashmap::DashMap;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Collects the gateway's collaborators and runs the startup reconciliation.
#[derive(Default)]
pub struct GatewayBuilder {
    container: Option<Arc<dyn DeviceContainer>>,
    factory: Option<Arc<dyn ClientFactory>>,
    repo: Option<Arc<dyn InstanceRepository>>,
    sink: Option<Arc<dyn EventSink>>,
    file_storage: Option<Arc<dyn FileStorage>>,
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub fn with_device_container(mut self, container: Arc<dyn DeviceContainer>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_repository(mut self, repo: Arc<dyn InstanceRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Where processed events go. Defaults to [`LogSink`].
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides the storage that `file_storage_dir` would otherwise create.
    pub fn with_file_storage(mut self, storage: Arc<dyn FileStorage>) -> Self {
        self.file_storage = Some(storage);
        self
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs [`load`](Self::load) and publishes the result as the process-wide gateway.
    ///
    /// Concurrent callers are serialized on the cell: exactly one runs the
    /// reconciliation, the rest get `AlreadyInitialized` without touching any device.
    pub async fn load_global(self) -> Result<Arc<Gateway>> {
        let mut loaded_here = false;
        let gateway = INSTANCE
            .get_or_try_init(|| {
                loaded_here = true;
                self.load()
            })
            .await?;

        if !loaded_here {
            return Err(GatewayError::AlreadyInitialized);
        }
        Ok(gateway.clone())
    }

    /// Reconciles persisted devices against instance records and returns a
    /// gateway with every surviving session registered.
    ///
    /// Only listing devices or instances can fail this; problems with a single
    /// device are logged and that device is skipped.
    pub async fn load(self) -> Result<Arc<Gateway>> {
        let container = self
            .container
            .ok_or(GatewayError::Builder("a device container"))?;
        let factory = self
            .factory
            .ok_or(GatewayError::Builder("a client factory"))?;
        let repo = self
            .repo
            .ok_or(GatewayError::Builder("an instance repository"))?;
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));
        let config = self.config;
        config.validate()?;

        let devices = container.get_all_devices().await?;
        let instances = repo.list("").await.inspect_err(|e| {
            error!(target: "Gateway/Bootstrap", "Failed to list instances: {e}");
        })?;

        let instance_cache = DashMap::new();
        let mut by_remote_jid: HashMap<String, Instance> = HashMap::new();
        for instance in instances {
            if !instance.remote_jid.is_empty() {
                by_remote_jid.insert(instance.remote_jid.clone(), instance.clone());
            }
            instance_cache.insert(instance.id.clone(), instance);
        }

        let clients: DashMap<String, Arc<dyn ProtocolClient>> = DashMap::new();
        for device in devices {
            let client = factory.new_client(device);
            let Some(jid) = client.device().id else {
                warn!(target: "Gateway/Bootstrap", "Discarding device without identity");
                teardown_client(container.as_ref(), client.as_ref()).await;
                continue;
            };

            let Some(instance) = by_remote_jid.get(&jid.to_string()) else {
                warn!(target: "Gateway/Bootstrap", "Discarding device {jid}: no instance owns it");
                teardown_client(container.as_ref(), client.as_ref()).await;
                continue;
            };

            if clients.contains_key(&instance.id) {
                warn!(
                    target: "Gateway/Bootstrap",
                    "Instance {} already has a device, discarding duplicate {jid}",
                    instance.id
                );
                teardown_client(container.as_ref(), client.as_ref()).await;
                continue;
            }

            configure_proxy(client.as_ref(), &instance.proxy);
            clients.insert(instance.id.clone(), client.clone());

            if client.is_logged_in() {
                if let Err(e) = client.connect().await {
                    error!(target: "Gateway/Bootstrap", "Failed to connect connected device {jid}: {e}");
                }
            }
        }

        let file_storage = match (self.file_storage, &config.file_storage_dir) {
            (Some(storage), _) => Some(storage),
            (None, Some(dir)) => {
                let storage = LocalFileStorage::new(dir).await?;
                Some(Arc::new(storage) as Arc<dyn FileStorage>)
            }
            (None, None) => None,
        };

        let (emitter, emit_rx) = emitter::channel(config.emitter_buffer_size);
        let semaphore = Arc::new(Semaphore::new(config.handler_semaphore_size));
        let qr_cache = Arc::new(DashMap::new());

        let gateway = Arc::new(Gateway {
            clients,
            observers: ObserverSet::new(qr_cache.clone()),
            qr_cache,
            instance_cache,
            container,
            factory,
            repo,
            file_storage,
            emitter,
            config,
        });

        tokio::spawn(emitter::run(
            Arc::downgrade(&gateway),
            emit_rx,
            semaphore,
            sink,
        ));

        for entry in gateway.clients.iter() {
            info!(target: "Gateway/Bootstrap", "Starting event handler for {}", entry.key());
            entry
                .value()
                .add_event_handler(gateway.event_handler(entry.key()));
        }

        info!(
            target: "Gateway/Bootstrap",
            "Gateway loaded with {} session(s)",
            gateway.clients.len()
        );
        Ok(gateway)
    }
}
