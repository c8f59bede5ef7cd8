use crate::types::jid::Jid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("device not found: {0}")]
    DeviceNotFound(Jid),

    #[error("backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, StoreError>;
