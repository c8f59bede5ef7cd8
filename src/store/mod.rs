pub mod error;
pub mod generic;
pub mod memory;

use crate::types::jid::Jid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{Result, StoreError};
pub use memory::MemoryDeviceContainer;

/// A persisted device identity. `id` stays `None` until the device is paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<Jid>,
    pub registration_id: u32,
    pub push_name: String,
}

impl Device {
    /// Creates a new, unregistered device.
    pub fn new() -> Self {
        Self {
            id: None,
            registration_id: rand::random(),
            push_name: String::new(),
        }
    }

    pub fn paired(jid: Jid) -> Self {
        Self {
            id: Some(jid),
            ..Self::new()
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for every device known to this process, across all tenants.
#[async_trait]
pub trait DeviceContainer: Send + Sync {
    async fn get_all_devices(&self) -> Result<Vec<Device>>;

    /// Allocates a fresh unregistered device. Nothing is persisted until `put_device`.
    fn new_device(&self) -> Device;

    async fn put_device(&self, device: &Device) -> Result<()>;

    async fn delete_device(&self, device: &Device) -> Result<()>;
}
