//! The protocol client boundary.
//!
//! The gateway never speaks the messaging protocol itself. Each tenant owns one
//! [`ProtocolClient`], built by a [`ClientFactory`] from a persisted or freshly
//! allocated [`Device`].

use crate::qrcode::{QrCodeEvent, QrError};
use crate::store::Device;
use crate::types::events::EventHandler;
use crate::types::jid::Jid;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not logged in")]
    NotLoggedIn,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("identity store error: {0}")]
    IdentityStore(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Snapshot of the device this client runs on. `id` is set once paired.
    fn device(&self) -> Device;

    fn is_connected(&self) -> bool;

    fn is_logged_in(&self) -> bool;

    async fn connect(&self) -> Result<(), ClientError>;

    async fn disconnect(&self);

    /// Revokes the linked device on the server side.
    async fn logout(&self) -> Result<(), ClientError>;

    /// Opens the pairing channel. Must be called before `connect` on an unpaired client.
    async fn get_qr_channel(&self) -> Result<mpsc::Receiver<QrCodeEvent>, QrError>;

    /// `None` clears any proxy.
    fn set_proxy(&self, proxy_url: Option<&str>);

    fn add_event_handler(&self, handler: Arc<dyn EventHandler>);

    fn remove_event_handlers(&self);

    async fn get_lid_for_pn(&self, pn: &Jid) -> Result<Option<Jid>, ClientError>;

    async fn get_pn_for_lid(&self, lid: &Jid) -> Result<Option<Jid>, ClientError>;
}

pub trait ClientFactory: Send + Sync {
    fn new_client(&self, device: Device) -> Arc<dyn ProtocolClient>;
}
