//! Tenant (instance) records.

pub mod memory;

use crate::types::instance::{Instance, InstanceUpdate};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryInstanceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("instance not found: {0}")]
    NotFound(String),
    #[error("instance already exists: {0}")]
    AlreadyExists(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Lists instances. An empty `id` lists all of them, otherwise only the matching one.
    async fn list(&self, id: &str) -> Result<Vec<Instance>>;

    async fn get(&self, id: &str) -> Result<Option<Instance>>;

    async fn create(&self, instance: Instance) -> Result<Instance>;

    /// Applies a partial update and returns the stored record.
    async fn update(&self, id: &str, update: InstanceUpdate) -> Result<Instance>;

    async fn delete(&self, id: &str) -> Result<()>;
}
