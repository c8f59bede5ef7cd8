use crate::client::{ClientError, ClientFactory, ProtocolClient};
use crate::config::GatewayConfig;
use crate::gateway::{EventSink, Gateway, WebhookPayload};
use crate::qrcode::{QrCodeEvent, QrError};
use crate::repository::MemoryInstanceRepository;
use crate::store::{Device, MemoryDeviceContainer};
use crate::types::events::{CoreEventBus, Event, EventHandler};
use crate::types::instance::Instance;
use crate::types::jid::Jid;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

/// Scriptable protocol client. Tests drive pairing by pushing QR events.
pub struct MockClient {
    device: Mutex<Device>,
    logged_in: AtomicBool,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_qr_channel: AtomicBool,
    fail_lookups: AtomicBool,
    qr_tx: Mutex<Option<mpsc::Sender<QrCodeEvent>>>,
    proxy: Mutex<Option<String>>,
    lid_by_pn: Mutex<HashMap<String, Jid>>,
    pn_by_lid: Mutex<HashMap<String, Jid>>,
    pub bus: CoreEventBus,
    pub qr_channel_opens: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
}

impl MockClient {
    pub fn new(device: Device) -> Self {
        let logged_in = device.id.is_some();
        Self {
            device: Mutex::new(device),
            logged_in: AtomicBool::new(logged_in),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_qr_channel: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
            qr_tx: Mutex::new(None),
            proxy: Mutex::new(None),
            lid_by_pn: Mutex::new(HashMap::new()),
            pn_by_lid: Mutex::new(HashMap::new()),
            bus: CoreEventBus::new(),
            qr_channel_opens: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_qr_channel(&self, fail: bool) {
        self.fail_qr_channel.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn has_qr_channel(&self) -> bool {
        self.qr_tx.lock().unwrap().is_some()
    }

    /// Pushes an event onto the open QR channel. Returns false if none is open.
    pub async fn send_qr(&self, event: QrCodeEvent) -> bool {
        let tx = self.qr_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn close_qr_channel(&self) {
        self.qr_tx.lock().unwrap().take();
    }

    /// The handshake has stored the account JID but the client has not
    /// reconnected as logged in yet.
    pub fn store_identity(&self, jid: Jid) {
        self.device.lock().unwrap().id = Some(jid);
    }

    /// What the real client does right before emitting `Success`.
    pub fn complete_pairing(&self, jid: Jid) {
        self.device.lock().unwrap().id = Some(jid);
        self.logged_in.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn add_mapping(&self, pn: &Jid, lid: &Jid) {
        self.lid_by_pn
            .lock()
            .unwrap()
            .insert(pn.to_non_ad().to_string(), lid.clone());
        self.pn_by_lid
            .lock()
            .unwrap()
            .insert(lid.to_non_ad().to_string(), pn.clone());
    }

    pub fn proxy(&self) -> Option<String> {
        self.proxy.lock().unwrap().clone()
    }

    pub fn emit(&self, event: &Event) {
        self.bus.dispatch(event);
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    fn device(&self) -> Device {
        self.device.lock().unwrap().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), ClientError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Connect("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.qr_tx.lock().unwrap().take();
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            return Err(ClientError::NotLoggedIn);
        }
        self.connected.store(false, Ordering::SeqCst);
        self.device.lock().unwrap().id = None;
        Ok(())
    }

    async fn get_qr_channel(&self) -> Result<mpsc::Receiver<QrCodeEvent>, QrError> {
        self.qr_channel_opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_qr_channel.load(Ordering::SeqCst) {
            return Err(QrError::Unavailable("mock failure".to_string()));
        }
        if self.is_connected() {
            return Err(QrError::AlreadyConnected);
        }
        if self.device().id.is_some() {
            return Err(QrError::AlreadyLoggedIn);
        }
        let (tx, rx) = mpsc::channel(8);
        *self.qr_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn set_proxy(&self, proxy_url: Option<&str>) {
        *self.proxy.lock().unwrap() = proxy_url.map(str::to_string);
    }

    fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.bus.add_handler(handler);
    }

    fn remove_event_handlers(&self) {
        self.bus.clear_handlers();
    }

    async fn get_lid_for_pn(&self, pn: &Jid) -> Result<Option<Jid>, ClientError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(ClientError::IdentityStore("lid lookup failed".to_string()));
        }
        Ok(self
            .lid_by_pn
            .lock()
            .unwrap()
            .get(&pn.to_non_ad().to_string())
            .cloned())
    }

    async fn get_pn_for_lid(&self, lid: &Jid) -> Result<Option<Jid>, ClientError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(ClientError::IdentityStore("pn lookup failed".to_string()));
        }
        Ok(self
            .pn_by_lid
            .lock()
            .unwrap()
            .get(&lid.to_non_ad().to_string())
            .cloned())
    }
}

/// Hands out [`MockClient`]s and remembers them so tests can reach them.
#[derive(Default)]
pub struct MockClientFactory {
    created: Mutex<Vec<Arc<MockClient>>>,
    unauthenticated: Mutex<HashSet<String>>,
    fail_connect: AtomicBool,
    fail_qr_channel: AtomicBool,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients built for this paired JID will report not logged in.
    pub fn mark_unauthenticated(&self, jid: &Jid) {
        self.unauthenticated.lock().unwrap().insert(jid.to_string());
    }

    /// Clients built from now on fail to connect.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Clients built from now on fail to open the QR channel.
    pub fn set_fail_qr_channel(&self, fail: bool) {
        self.fail_qr_channel.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<MockClient>> {
        self.created.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Arc<MockClient>> {
        self.created.lock().unwrap().last().cloned()
    }

    /// The client built for a persisted device, found by registration id.
    pub fn for_device(&self, device: &Device) -> Option<Arc<MockClient>> {
        self.created()
            .into_iter()
            .find(|c| c.device().registration_id == device.registration_id)
    }
}

impl ClientFactory for MockClientFactory {
    fn new_client(&self, device: Device) -> Arc<dyn ProtocolClient> {
        let unauthenticated = device
            .id
            .as_ref()
            .is_some_and(|jid| self.unauthenticated.lock().unwrap().contains(&jid.to_string()));
        let client = Arc::new(MockClient::new(device));
        if unauthenticated {
            client.set_logged_in(false);
        }
        client.set_fail_connect(self.fail_connect.load(Ordering::SeqCst));
        client.set_fail_qr_channel(self.fail_qr_channel.load(Ordering::SeqCst));
        self.created.lock().unwrap().push(client.clone());
        client
    }
}

/// Collects delivered payloads on a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<WebhookPayload>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<WebhookPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, payload: WebhookPayload) -> anyhow::Result<()> {
        self.tx.send(payload)?;
        Ok(())
    }
}

/// Never finishes a delivery until released.
pub struct BlockingSink {
    pub started: AtomicUsize,
    release: Notify,
}

impl BlockingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            release: Notify::new(),
        })
    }

    pub fn release_all(&self) {
        self.release.notify_waiters();
    }
}

#[async_trait]
impl EventSink for BlockingSink {
    async fn deliver(&self, _payload: WebhookPayload) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(())
    }
}

pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub factory: Arc<MockClientFactory>,
    pub container: Arc<MemoryDeviceContainer>,
    pub repo: Arc<MemoryInstanceRepository>,
}

pub struct HarnessBuilder {
    devices: Vec<Device>,
    instances: Vec<Instance>,
    unauthenticated: Vec<Jid>,
    fail_connect: bool,
    sink: Option<Arc<dyn EventSink>>,
    config: GatewayConfig,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            devices: Vec::new(),
            instances: Vec::new(),
            unauthenticated: Vec::new(),
            fail_connect: false,
            sink: None,
            config: GatewayConfig::default(),
        }
    }

    /// The mock behind the client currently registered for `id`.
    pub fn mock_for(&self, id: &str) -> Arc<MockClient> {
        let registered = self.gateway.client(id).expect("client registered");
        let registered_device = registered.device();
        self.factory
            .created()
            .into_iter()
            .rev()
            .find(|c| c.device().registration_id == registered_device.registration_id)
            .expect("client built by the mock factory")
    }
}

impl HarnessBuilder {
    pub fn device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn unauthenticated(mut self, jid: Jid) -> Self {
        self.unauthenticated.push(jid);
        self
    }

    /// Every client the factory builds, bootstrap included, fails to connect.
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn load(self) -> Harness {
        let factory = Arc::new(MockClientFactory::new());
        for jid in &self.unauthenticated {
            factory.mark_unauthenticated(jid);
        }
        factory.set_fail_connect(self.fail_connect);
        let container = Arc::new(MemoryDeviceContainer::with_devices(self.devices).await);
        let repo = Arc::new(MemoryInstanceRepository::with_instances(self.instances).await);

        let mut builder = Gateway::builder()
            .with_device_container(container.clone())
            .with_client_factory(factory.clone())
            .with_repository(repo.clone())
            .with_config(self.config);
        if let Some(sink) = self.sink {
            builder = builder.with_event_sink(sink);
        }
        let gateway = builder.load().await.expect("gateway should load");

        Harness {
            gateway,
            factory,
            container,
            repo,
        }
    }
}
