use super::generic::MemoryTable;
use super::{Device, DeviceContainer, Result, StoreError};
use async_trait::async_trait;
use log::debug;

/// In-memory device container keyed by registration id.
#[derive(Default)]
pub struct MemoryDeviceContainer {
    devices: MemoryTable<u32, Device>,
}

impl MemoryDeviceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let container = Self::new();
        for device in devices {
            container.devices.upsert(device.registration_id, device).await;
        }
        container
    }

    pub async fn len(&self) -> usize {
        self.devices.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.is_empty().await
    }

    pub async fn contains(&self, device: &Device) -> bool {
        self.devices.contains(&device.registration_id).await
    }
}

#[async_trait]
impl DeviceContainer for MemoryDeviceContainer {
    async fn get_all_devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.values().await)
    }

    fn new_device(&self) -> Device {
        Device::new()
    }

    async fn put_device(&self, device: &Device) -> Result<()> {
        self.devices
            .upsert(device.registration_id, device.clone())
            .await;
        Ok(())
    }

    async fn delete_device(&self, device: &Device) -> Result<()> {
        let removed = self.devices.remove(&device.registration_id).await;
        match (&device.id, removed) {
            (Some(jid), None) => Err(StoreError::DeviceNotFound(jid.clone())),
            _ => {
                debug!("Deleted device {:?}", device.id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::jid::Jid;

    #[tokio::test]
    async fn put_list_and_delete() {
        let container = MemoryDeviceContainer::new();
        let device = Device::paired(Jid::pn("5511000000001"));
        container.put_device(&device).await.unwrap();

        let all = container.get_all_devices().await.unwrap();
        assert_eq!(all, vec![device.clone()]);

        container.delete_device(&device).await.unwrap();
        assert!(container.is_empty().await);
    }

    #[tokio::test]
    async fn deleting_unknown_paired_device_fails() {
        let container = MemoryDeviceContainer::new();
        let device = Device::paired(Jid::pn("5511000000002"));
        assert!(matches!(
            container.delete_device(&device).await,
            Err(StoreError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_unpersisted_fresh_device_is_a_no_op() {
        let container = MemoryDeviceContainer::new();
        let device = container.new_device();
        assert!(device.id.is_none());
        container.delete_device(&device).await.unwrap();
    }
}
