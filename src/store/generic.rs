use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use tokio::sync::RwLock;

/// Keyed table shared by the in-memory device container and instance repository.
pub struct MemoryTable<K, V> {
    rows: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for MemoryTable<K, V> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> MemoryTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.rows.read().await.get(key).cloned()
    }

    /// Inserts or replaces the row under `key`.
    pub async fn upsert(&self, key: K, value: V) {
        self.rows.write().await.insert(key, value);
    }

    /// Inserts only if `key` is free. Returns false when a row already exists.
    pub async fn insert_new(&self, key: K, value: V) -> bool {
        match self.rows.write().await.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.rows.read().await.contains_key(key)
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.rows.write().await.remove(key)
    }

    pub async fn values(&self) -> Vec<V> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Mutates the row under `key` in place and returns what `f` returns.
    pub async fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.rows.write().await.get_mut(key).map(f)
    }
}
