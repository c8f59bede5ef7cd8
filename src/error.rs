use crate::client::ClientError;
use crate::config::ConfigError;
use crate::qrcode::QrError;
use crate::repository::RepositoryError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("device store error: {0}")]
    Store(#[from] StoreError),
    #[error("instance repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    #[error("pairing channel error: {0}")]
    Qr(#[from] QrError),
    #[error("file storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("gateway builder is missing {0}")]
    Builder(&'static str),
    #[error("gateway already initialized")]
    AlreadyInitialized,
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
