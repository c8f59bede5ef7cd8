//! Session-lifecycle core of a multi-tenant WhatsApp gateway.
//!
//! Every instance (tenant) owns one protocol client. [`gateway::Gateway`]
//! reconciles persisted devices at startup, runs QR pairing on demand, reports
//! per-instance connection state and tears sessions down on request.

pub mod types {
    pub mod events;
    pub mod instance;
    pub mod jid;
}

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod qrcode;
pub mod repository;
pub mod storage;
pub mod store;

#[cfg(test)]
pub mod test_utils;

pub use client::{ClientFactory, ProtocolClient};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{ConnectionStatus, Gateway, GatewayBuilder};
pub use types::jid::Jid;
