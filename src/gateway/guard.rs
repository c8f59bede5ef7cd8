use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Tracks which instances have a pairing observer running.
#[derive(Clone)]
pub(crate) struct ObserverSet {
    running: Arc<DashMap<String, ()>>,
    qr_cache: Arc<DashMap<String, String>>,
}

impl ObserverSet {
    pub(crate) fn new(qr_cache: Arc<DashMap<String, String>>) -> Self {
        Self {
            running: Arc::new(DashMap::new()),
            qr_cache,
        }
    }

    /// Claims the observer slot for `id`, or returns `None` if one is already running.
    ///
    /// The check and the insert happen under the same shard lock.
    pub(crate) fn try_acquire(&self, id: &str) -> Option<ObserverGuard> {
        match self.running.entry(id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(ObserverGuard {
                    id: id.to_string(),
                    running: self.running.clone(),
                    qr_cache: self.qr_cache.clone(),
                })
            }
        }
    }

    pub(crate) fn is_running(&self, id: &str) -> bool {
        self.running.contains_key(id)
    }
}

/// Held by the observer for its whole lifetime. Dropping it releases the slot
/// and forgets any QR code cached for the instance.
pub(crate) struct ObserverGuard {
    id: String,
    running: Arc<DashMap<String, ()>>,
    qr_cache: Arc<DashMap<String, String>>,
}

impl ObserverGuard {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.running.remove(&self.id);
        self.qr_cache.remove(&self.id);
    }
}
