//! In-memory key-value store.

use super::KeyValueStore;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory key-value store.
///
/// Clones share the same contents. [`MemoryKvStore::set_unavailable`]
/// makes every operation fail, which is how tests exercise the
/// "persistence unavailable" paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<MemoryKvInner>>,
}

#[derive(Debug, Default)]
struct MemoryKvInner {
    values: BTreeMap<String, String>,
    unavailable: bool,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or work again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryKvInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn available(&self) -> Result<MutexGuard<'_, MemoryKvInner>, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.available()?.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.available()?
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.available()?.values.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .available()?
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryKvStore::new();
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        store.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn clones_share_contents() {
        let store = MemoryKvStore::new();
        let other = store.clone();
        store.set("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn prefix_listing() {
        let store = MemoryKvStore::new();
        store.set("sync-key.a", "1").await.unwrap();
        store.set("sync-key.b", "2").await.unwrap();
        store.set("device_id", "3").await.unwrap();

        let keys = store.keys_with_prefix("sync-key.").await.unwrap();
        assert_eq!(keys, vec!["sync-key.a", "sync-key.b"]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryKvStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.get("a").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.set("a", "1").await.is_err());

        store.set_unavailable(false);
        assert!(store.set("a", "1").await.is_ok());
    }
}
