//! In-memory relay store.

use super::RelayStore;
use crate::error::RelayError;
use async_trait::async_trait;
use journal_sync_types::{DeviceId, MailboxRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory relay store.
///
/// Clones share the same mailboxes, so two orchestrators handed clones
/// of one store behave like two devices talking through one relay.
#[derive(Debug, Clone)]
pub struct MemoryRelayStore {
    inner: Arc<Mutex<MemoryRelayInner>>,
    listen: bool,
}

#[derive(Debug, Default)]
struct MemoryRelayInner {
    provisioned: bool,
    mailboxes: HashMap<DeviceId, Mailbox>,
    writes: usize,
}

#[derive(Debug)]
struct Mailbox {
    key_hash: String,
    records: BTreeMap<DeviceId, MailboxRecord>,
}

impl Default for MemoryRelayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRelayStore {
    /// Create a provisioned, empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryRelayInner {
                provisioned: true,
                ..Default::default()
            })),
            listen: true,
        }
    }

    /// Create a store that rejects everything as not provisioned.
    pub fn unprovisioned() -> Self {
        let store = Self::new();
        store.set_provisioned(false);
        store
    }

    /// The same store without standing-listener support.
    pub fn without_listener(mut self) -> Self {
        self.listen = false;
        self
    }

    /// Switch provisioning on or off.
    pub fn set_provisioned(&self, provisioned: bool) {
        self.lock().provisioned = provisioned;
    }

    /// Records waiting in `target`'s mailbox.
    pub fn pending_count(&self, target: &DeviceId) -> usize {
        self.lock()
            .mailboxes
            .get(target)
            .map_or(0, |m| m.records.len())
    }

    /// Total successful writes.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRelayInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn provisioned(&self) -> Result<MutexGuard<'_, MemoryRelayInner>, RelayError> {
        let inner = self.lock();
        if !inner.provisioned {
            return Err(RelayError::NotProvisioned);
        }
        Ok(inner)
    }
}

fn authorize<'a>(
    mailboxes: &'a mut HashMap<DeviceId, Mailbox>,
    target: &DeviceId,
    key_hash: &str,
) -> Result<&'a mut Mailbox, RelayError> {
    let mailbox = mailboxes.entry(target.clone()).or_insert_with(|| Mailbox {
        key_hash: key_hash.to_string(),
        records: BTreeMap::new(),
    });
    if mailbox.key_hash != key_hash {
        return Err(RelayError::PermissionDenied {
            target: target.clone(),
        });
    }
    Ok(mailbox)
}

#[async_trait]
impl RelayStore for MemoryRelayStore {
    async fn claim(&self, owner: &DeviceId, key_hash: &str) -> Result<(), RelayError> {
        let mut inner = self.provisioned()?;
        authorize(&mut inner.mailboxes, owner, key_hash)?;
        Ok(())
    }

    async fn write(
        &self,
        target: &DeviceId,
        key_hash: &str,
        record: MailboxRecord,
    ) -> Result<(), RelayError> {
        let mut inner = self.provisioned()?;
        let mailbox = authorize(&mut inner.mailboxes, target, key_hash)?;
        mailbox.records.insert(record.from_device.clone(), record);
        inner.writes += 1;
        Ok(())
    }

    async fn pending(&self, target: &DeviceId) -> Result<Vec<MailboxRecord>, RelayError> {
        let inner = self.provisioned()?;
        let mut records: Vec<MailboxRecord> = inner
            .mailboxes
            .get(target)
            .map(|m| m.records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn clear(&self, target: &DeviceId, record: &MailboxRecord) -> Result<(), RelayError> {
        let mut inner = self.provisioned()?;
        if let Some(mailbox) = inner.mailboxes.get_mut(target) {
            if mailbox.records.get(&record.from_device) == Some(record) {
                mailbox.records.remove(&record.from_device);
            }
        }
        Ok(())
    }

    fn supports_listen(&self) -> bool {
        self.listen
    }
}
