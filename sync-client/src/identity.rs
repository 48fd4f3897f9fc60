//! This device's identity: its id and its relay mailbox key.
//!
//! Both are created on first use and persisted; later calls return the
//! stored values. Identity never blocks startup: when persistence fails
//! the manager falls back to an in-memory value for the lifetime of the
//! process and logs a warning.

use std::sync::Arc;

use journal_sync_types::{DeviceId, SyncKey};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::store::KeyValueStore;

/// Store key holding the device id.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Store key holding this device's sync key.
pub const SYNC_KEY_KEY: &str = "sync_key";

/// Creates and caches the device id and sync key.
#[derive(Clone)]
pub struct IdentityManager {
    store: Arc<dyn KeyValueStore>,
    device_id: Arc<Mutex<Option<DeviceId>>>,
    sync_key: Arc<Mutex<Option<SyncKey>>>,
}

impl IdentityManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            device_id: Arc::new(Mutex::new(None)),
            sync_key: Arc::new(Mutex::new(None)),
        }
    }

    /// This device's id, created on first call.
    pub async fn ensure_identity(&self) -> DeviceId {
        let mut cached = self.device_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let id = DeviceId::new(
            self.load_or_create(DEVICE_ID_KEY, || DeviceId::generate().to_string())
                .await,
        );
        *cached = Some(id.clone());
        id
    }

    /// This device's sync key, created on first call.
    pub async fn ensure_shared_secret(&self) -> SyncKey {
        let mut cached = self.sync_key.lock().await;
        if let Some(key) = cached.as_ref() {
            return key.clone();
        }

        let key = SyncKey::new(
            self.load_or_create(SYNC_KEY_KEY, || SyncKey::generate().expose().to_string())
                .await,
        );
        *cached = Some(key.clone());
        key
    }

    async fn load_or_create(&self, key: &str, generate: impl FnOnce() -> String) -> String {
        match self.store.get(key).await {
            Ok(Some(value)) if !value.trim().is_empty() => return value.trim().to_string(),
            Ok(_) => {}
            Err(e) => {
                warn!(key, error = %e, "identity storage unavailable, using ephemeral value");
                return generate();
            }
        }

        let value = generate();
        match self.store.set(key, &value).await {
            Ok(()) => info!(key, "created new identity value"),
            Err(e) => {
                warn!(key, error = %e, "failed to persist identity, using ephemeral value")
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    #[tokio::test]
    async fn identity_is_created_once() {
        let store = MemoryKvStore::new();
        let identity = IdentityManager::new(Arc::new(store.clone()));

        let first = identity.ensure_identity().await;
        let second = identity.ensure_identity().await;
        assert_eq!(first, second);
        assert_eq!(
            store.get(DEVICE_ID_KEY).await.unwrap().as_deref(),
            Some(first.as_str())
        );
    }

    #[tokio::test]
    async fn identity_survives_a_new_manager() {
        let store = Arc::new(MemoryKvStore::new());
        let first = IdentityManager::new(store.clone()).ensure_identity().await;
        let again = IdentityManager::new(store).ensure_identity().await;
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn shared_secret_is_created_once() {
        let store = Arc::new(MemoryKvStore::new());
        let identity = IdentityManager::new(store.clone());

        let key = identity.ensure_shared_secret().await;
        assert_eq!(key.expose().len(), 43);
        assert_eq!(identity.ensure_shared_secret().await, key);
        assert_eq!(
            IdentityManager::new(store).ensure_shared_secret().await,
            key
        );
    }

    #[tokio::test]
    async fn unavailable_storage_falls_back_to_ephemeral() {
        let store = MemoryKvStore::new();
        store.set_unavailable(true);
        let identity = IdentityManager::new(Arc::new(store.clone()));

        let id = identity.ensure_identity().await;
        assert!(id.as_str().starts_with("device-"));
        // Stable within the process even though nothing was persisted.
        assert_eq!(identity.ensure_identity().await, id);

        store.set_unavailable(false);
        assert!(store.get(DEVICE_ID_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_stored_value_is_replaced() {
        let store = MemoryKvStore::new();
        store.set(DEVICE_ID_KEY, "  ").await.unwrap();
        let identity = IdentityManager::new(Arc::new(store.clone()));

        let id = identity.ensure_identity().await;
        assert!(!id.as_str().trim().is_empty());
        assert_eq!(
            store.get(DEVICE_ID_KEY).await.unwrap().as_deref(),
            Some(id.as_str())
        );
    }
}
