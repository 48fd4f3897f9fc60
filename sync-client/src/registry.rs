//! Device registry: the devices we paired with and their sync keys.
//!
//! The registry is the only state written by more than one component
//! (pairing writes, the orchestrator reads and stamps `lastSyncAt`).
//! Mutations are serialized by an async lock; each one is a complete
//! read-modify-write of the stored list.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use journal_sync_core::PairingPayload;
use journal_sync_types::{DeviceId, PairedDevice, SyncKey};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{get_json, set_json, KeyValueStore};

/// Store key holding the JSON array of paired devices.
pub const PAIRED_DEVICES_KEY: &str = "paired_devices";

/// Prefix of the per-device sync key records.
pub const SYNC_KEY_PREFIX: &str = "sync-key.";

/// Registry of paired devices.
#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl DeviceRegistry {
    /// Create a registry over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// All paired devices, deduplicated by id (first occurrence wins).
    ///
    /// Stored order is kept; sorting is up to the caller.
    pub async fn list_paired(&self) -> Result<Vec<PairedDevice>, StoreError> {
        let stored: Vec<PairedDevice> = get_json(self.store.as_ref(), PAIRED_DEVICES_KEY)
            .await?
            .unwrap_or_default();

        let mut seen = HashSet::new();
        Ok(stored
            .into_iter()
            .filter(|device| seen.insert(device.id.clone()))
            .collect())
    }

    /// Look up one device.
    pub async fn get(&self, id: &DeviceId) -> Result<Option<PairedDevice>, StoreError> {
        Ok(self.list_paired().await?.into_iter().find(|d| &d.id == id))
    }

    /// Whether `id` is registered.
    pub async fn is_paired(&self, id: &DeviceId) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Insert `device`, or rename the entry with the same id.
    ///
    /// An existing entry keeps its `pairedAt` and `lastSyncAt`. Returns
    /// the entry as stored.
    pub async fn upsert(&self, device: PairedDevice) -> Result<PairedDevice, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut devices = self.list_paired().await?;
        let stored = match devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => {
                existing.name = device.name;
                existing.clone()
            }
            None => {
                devices.push(device.clone());
                device
            }
        };
        set_json(self.store.as_ref(), PAIRED_DEVICES_KEY, &devices).await?;
        Ok(stored)
    }

    /// Stamp `lastSyncAt = now` on `id`. Returns false if `id` is not registered.
    pub async fn record_sync_success(&self, id: &DeviceId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut devices = self.list_paired().await?;
        let Some(device) = devices.iter_mut().find(|d| &d.id == id) else {
            debug!(device = %id, "sync success for unregistered device ignored");
            return Ok(false);
        };
        device.last_sync_at = Some(Utc::now());
        set_json(self.store.as_ref(), PAIRED_DEVICES_KEY, &devices).await?;
        Ok(true)
    }

    /// Register the device described by a decoded pairing code and keep its sync key.
    pub async fn pair(&self, payload: &PairingPayload) -> Result<PairedDevice, StoreError> {
        self.store
            .set(&sync_key_record(&payload.device_id), payload.sync_key.expose())
            .await?;

        let device = self
            .upsert(PairedDevice::new(
                payload.device_id.clone(),
                payload.device_name.clone(),
            ))
            .await?;
        info!(device = %device.id, name = %device.name, "paired device");
        Ok(device)
    }

    /// The sync key on record for `id`.
    pub async fn sync_key(&self, id: &DeviceId) -> Result<Option<SyncKey>, StoreError> {
        Ok(self
            .store
            .get(&sync_key_record(id))
            .await?
            .filter(|key| !key.is_empty())
            .map(SyncKey::new))
    }

    /// Forget every device and every stored sync key.
    pub async fn remove_all(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        for key in self.store.keys_with_prefix(SYNC_KEY_PREFIX).await? {
            self.store.remove(&key).await?;
        }
        self.store.remove(PAIRED_DEVICES_KEY).await?;
        info!("forgot all paired devices");
        Ok(())
    }
}

fn sync_key_record(id: &DeviceId) -> String {
    format!("{}{}", SYNC_KEY_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    fn registry() -> (DeviceRegistry, MemoryKvStore) {
        let store = MemoryKvStore::new();
        (DeviceRegistry::new(Arc::new(store.clone())), store)
    }

    fn payload(id: &str, name: &str) -> PairingPayload {
        PairingPayload::new(DeviceId::new(id), SyncKey::new(format!("key-{}", id)), name)
    }

    #[tokio::test]
    async fn empty_registry() {
        let (registry, _) = registry();
        assert!(registry.list_paired().await.unwrap().is_empty());
        assert!(!registry.is_paired(&DeviceId::new("x")).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_inserts_then_renames() {
        let (registry, _) = registry();
        let id = DeviceId::new("device-a");

        registry
            .upsert(PairedDevice::new(id.clone(), "Old name"))
            .await
            .unwrap();
        registry
            .upsert(PairedDevice::new(id.clone(), "New name"))
            .await
            .unwrap();

        let devices = registry.list_paired().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "New name");
    }

    #[tokio::test]
    async fn duplicate_entries_first_wins() {
        let (registry, store) = registry();
        let first = PairedDevice::new(DeviceId::new("device-a"), "First");
        let second = PairedDevice::new(DeviceId::new("device-a"), "Second");
        set_json(&store, PAIRED_DEVICES_KEY, &vec![first, second])
            .await
            .unwrap();

        let devices = registry.list_paired().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "First");
    }

    #[tokio::test]
    async fn record_sync_success_stamps_last_sync() {
        let (registry, _) = registry();
        let id = DeviceId::new("device-a");
        registry.pair(&payload("device-a", "Phone")).await.unwrap();
        assert!(registry.get(&id).await.unwrap().unwrap().last_sync_at.is_none());

        assert!(registry.record_sync_success(&id).await.unwrap());
        assert!(registry.get(&id).await.unwrap().unwrap().last_sync_at.is_some());
    }

    #[tokio::test]
    async fn record_sync_success_for_unknown_device_is_noop() {
        let (registry, store) = registry();
        assert!(!registry
            .record_sync_success(&DeviceId::new("ghost"))
            .await
            .unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn pair_stores_sync_key() {
        let (registry, _) = registry();
        let device = registry.pair(&payload("device-a", "Phone")).await.unwrap();

        assert_eq!(device.name, "Phone");
        assert_eq!(
            registry.sync_key(&device.id).await.unwrap(),
            Some(SyncKey::new("key-device-a"))
        );
        assert!(registry.sync_key(&DeviceId::new("other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repairing_keeps_history_and_updates_name_and_key() {
        let (registry, _) = registry();
        let id = DeviceId::new("device-a");
        let first = registry.pair(&payload("device-a", "Phone")).await.unwrap();
        registry.record_sync_success(&id).await.unwrap();
        let synced = registry.get(&id).await.unwrap().unwrap();

        let again = PairingPayload::new(id.clone(), SyncKey::new("rotated"), "Work phone");
        let repaired = registry.pair(&again).await.unwrap();

        assert_eq!(repaired.name, "Work phone");
        assert_eq!(repaired.paired_at, first.paired_at);
        assert_eq!(repaired.last_sync_at, synced.last_sync_at);
        assert!(repaired.last_sync_at.is_some());
        assert_eq!(registry.get(&id).await.unwrap(), Some(repaired));
        assert_eq!(registry.list_paired().await.unwrap().len(), 1);
        assert_eq!(
            registry.sync_key(&id).await.unwrap(),
            Some(SyncKey::new("rotated"))
        );
    }

    #[tokio::test]
    async fn remove_all_clears_devices_and_keys() {
        let (registry, store) = registry();
        registry.pair(&payload("device-a", "Phone")).await.unwrap();
        registry.pair(&payload("device-b", "Tablet")).await.unwrap();
        store.set("device_id", "me").await.unwrap();

        registry.remove_all().await.unwrap();

        assert!(registry.list_paired().await.unwrap().is_empty());
        assert!(registry
            .sync_key(&DeviceId::new("device-a"))
            .await
            .unwrap()
            .is_none());
        // Our own identity is not part of the registry.
        assert_eq!(store.get("device_id").await.unwrap().as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_lose_devices() {
        let (registry, _) = registry();
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .upsert(PairedDevice::new(DeviceId::new(format!("device-{}", i)), "d"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.list_paired().await.unwrap().len(), 8);
    }
}
