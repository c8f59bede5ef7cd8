use super::{InstanceRepository, RepositoryError, Result};
use crate::store::generic::MemoryTable;
use crate::types::instance::{Instance, InstanceUpdate};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory instance repository.
#[derive(Default)]
pub struct MemoryInstanceRepository {
    instances: MemoryTable<String, Instance>,
    unavailable: AtomicBool,
}

impl MemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_instances(instances: impl IntoIterator<Item = Instance>) -> Self {
        let repo = Self::new();
        for instance in instances {
            repo.instances.upsert(instance.id.clone(), instance).await;
        }
        repo
    }

    /// Makes every call fail with `Unavailable`, as a lost backend connection would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("backend offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceRepository for MemoryInstanceRepository {
    async fn list(&self, id: &str) -> Result<Vec<Instance>> {
        self.check_available()?;
        if !id.is_empty() {
            return Ok(self.instances.get(&id.to_string()).await.into_iter().collect());
        }
        let mut all = self.instances.values().await;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Option<Instance>> {
        self.check_available()?;
        Ok(self.instances.get(&id.to_string()).await)
    }

    async fn create(&self, instance: Instance) -> Result<Instance> {
        self.check_available()?;
        if !self
            .instances
            .insert_new(instance.id.clone(), instance.clone())
            .await
        {
            return Err(RepositoryError::AlreadyExists(instance.id));
        }
        Ok(instance)
    }

    async fn update(&self, id: &str, update: InstanceUpdate) -> Result<Instance> {
        self.check_available()?;
        self.instances
            .update(&id.to_string(), |instance| {
                update.apply_to(instance);
                instance.clone()
            })
            .await
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_available()?;
        self.instances
            .remove(&id.to_string())
            .await
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}
