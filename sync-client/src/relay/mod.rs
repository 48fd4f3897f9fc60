//! Relay store client.
//!
//! The relay is a shared, always-reachable store used when no direct
//! channel is available. It is a mailbox, not a log: each target device
//! has one slot per sender, a newer write from the same sender replaces
//! the pending one, and the owner clears a record once it has been
//! handed to its handler.
//!
//! Mailboxes are addressed by device id and authorized by the SHA-256
//! fingerprint of the owner's sync key. The first key presented claims
//! the mailbox; later writes with a different key are rejected. The
//! relay never sees a raw key.

mod memory;
mod sqlite;

pub use memory::MemoryRelayStore;
pub use sqlite::SqliteRelayStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use journal_sync_types::{DeviceId, MailboxRecord, SyncKey, SyncPayload};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::MIN_RELAY_POLL_INTERVAL;
use crate::error::{PublishError, PublishFailure, RelayError};

/// Trait for relay store backends.
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Claim `owner`'s mailbox for the key with `key_hash`.
    ///
    /// Claiming an unclaimed mailbox or re-claiming with the same key
    /// succeeds; a different key is `PermissionDenied`.
    async fn claim(&self, owner: &DeviceId, key_hash: &str) -> Result<(), RelayError>;

    /// Put `record` in `target`'s mailbox, replacing any pending record
    /// from the same sender.
    async fn write(
        &self,
        target: &DeviceId,
        key_hash: &str,
        record: MailboxRecord,
    ) -> Result<(), RelayError>;

    /// Pending records for `target`, oldest first.
    async fn pending(&self, target: &DeviceId) -> Result<Vec<MailboxRecord>, RelayError>;

    /// Remove `record` from `target`'s mailbox if it is still the pending
    /// one from its sender. A record that has since been replaced (by
    /// timestamp or content) is left alone.
    async fn clear(&self, target: &DeviceId, record: &MailboxRecord) -> Result<(), RelayError>;

    /// Check if this backend can serve a standing listener.
    fn supports_listen(&self) -> bool {
        true
    }
}

/// Client side of the relay: publish, poll, subscribe.
#[derive(Clone)]
pub struct RelayClient {
    store: Arc<dyn RelayStore>,
}

impl RelayClient {
    /// Wrap a relay store backend.
    pub fn new(store: Arc<dyn RelayStore>) -> Self {
        Self { store }
    }

    /// Check if a standing listener is possible.
    pub fn supports_listen(&self) -> bool {
        self.store.supports_listen()
    }

    /// Claim our own mailbox with our sync key.
    pub async fn claim(&self, owner: &DeviceId, key: &SyncKey) -> Result<(), RelayError> {
        self.store.claim(owner, &key.fingerprint()).await
    }

    /// Write `payload` to `target`'s mailbox using `target_key`, the key
    /// `target` handed out in its pairing code.
    ///
    /// Returns the serialized payload size.
    pub async fn publish(
        &self,
        target: &DeviceId,
        target_key: &SyncKey,
        payload: &SyncPayload,
        sender: &DeviceId,
    ) -> Result<usize, PublishError> {
        let record = MailboxRecord::seal(payload, sender.clone()).map_err(|e| PublishError {
            reason: PublishFailure::Unknown(e.to_string()),
        })?;
        let size = record.data.len();

        self.store
            .write(target, &target_key.fingerprint(), record)
            .await
            .map_err(|e| {
                warn!(target = %target, error = %e, "relay write rejected");
                PublishError::from(e)
            })?;

        debug!(target = %target, bytes = size, "published to relay");
        Ok(size)
    }

    /// Hand every pending record for `owner` to `handler`.
    ///
    /// A record is cleared once its handler returns `true`; `false` leaves
    /// it in the mailbox for the next poll. Returns the number cleared.
    pub async fn poll_once<F, Fut>(
        &self,
        owner: &DeviceId,
        mut handler: F,
    ) -> Result<usize, RelayError>
    where
        F: FnMut(MailboxRecord) -> Fut,
        Fut: Future<Output = bool>,
    {
        let records = self.store.pending(owner).await?;
        let mut consumed = 0;
        for record in records {
            let handled = record.clone();
            if handler(record).await {
                self.store.clear(owner, &handled).await?;
                consumed += 1;
            }
        }
        Ok(consumed)
    }

    /// Poll `owner`'s mailbox every `interval` until the task is aborted.
    ///
    /// Intervals below [`MIN_RELAY_POLL_INTERVAL`] are raised to it.
    pub fn subscribe<F, Fut>(
        &self,
        owner: DeviceId,
        interval: Duration,
        mut handler: F,
    ) -> Result<JoinHandle<()>, RelayError>
    where
        F: FnMut(MailboxRecord) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if !self.supports_listen() {
            return Err(RelayError::ListenUnsupported);
        }

        let client = self.clone();
        let interval = interval.max(MIN_RELAY_POLL_INTERVAL);
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = client.poll_once(&owner, &mut handler).await {
                    warn!(owner = %owner, error = %e, "relay poll failed");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_sync_types::{EntryType, JournalEntry};
    use std::sync::Mutex;

    fn payload() -> SyncPayload {
        SyncPayload::snapshot(
            vec![JournalEntry::new("ran 5k", EntryType::Log)],
            vec![],
            vec![],
        )
    }

    #[tokio::test]
    async fn publish_then_poll_consumes_once() {
        let store = MemoryRelayStore::new();
        let client = RelayClient::new(Arc::new(store.clone()));
        let (a, b) = (DeviceId::new("device-a"), DeviceId::new("device-b"));
        let key_a = SyncKey::generate();
        client.claim(&a, &key_a).await.unwrap();

        let sent = payload();
        let size = client.publish(&a, &key_a, &sent, &b).await.unwrap();
        assert!(size > 0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handled = client
            .poll_once(&a, |record| {
                sink.lock().unwrap().push(record);
                async { true }
            })
            .await
            .unwrap();

        assert_eq!(handled, 1);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].from_device, b);
        assert_eq!(seen[0].open().unwrap(), sent);
        assert_eq!(store.pending_count(&a), 0);

        let again = client.poll_once(&a, |_| async { true }).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn unconsumed_record_stays_pending() {
        let store = MemoryRelayStore::new();
        let client = RelayClient::new(Arc::new(store.clone()));
        let (a, b) = (DeviceId::new("device-a"), DeviceId::new("device-b"));
        let key_a = SyncKey::generate();
        client.publish(&a, &key_a, &payload(), &b).await.unwrap();

        let consumed = client.poll_once(&a, |_| async { false }).await.unwrap();

        assert_eq!(consumed, 0);
        assert_eq!(store.pending_count(&a), 1);
    }

    #[tokio::test]
    async fn wrong_key_is_permission_denied() {
        let client = RelayClient::new(Arc::new(MemoryRelayStore::new()));
        let a = DeviceId::new("device-a");
        client.claim(&a, &SyncKey::generate()).await.unwrap();

        let err = client
            .publish(&a, &SyncKey::generate(), &payload(), &DeviceId::new("device-b"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, PublishFailure::PermissionDenied);
    }

    #[tokio::test]
    async fn unprovisioned_store() {
        let client = RelayClient::new(Arc::new(MemoryRelayStore::unprovisioned()));
        let err = client
            .publish(
                &DeviceId::new("device-a"),
                &SyncKey::generate(),
                &payload(),
                &DeviceId::new("device-b"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason, PublishFailure::NotProvisioned);
        assert!(err.remediation().is_some());
    }

    #[tokio::test]
    async fn subscribe_requires_listener_support() {
        let client = RelayClient::new(Arc::new(MemoryRelayStore::new().without_listener()));
        let result = client.subscribe(
            DeviceId::new("device-a"),
            Duration::from_millis(10),
            |_| async { true },
        );
        assert!(matches!(result, Err(RelayError::ListenUnsupported)));
    }

    #[tokio::test]
    async fn zero_interval_listener_keeps_running() {
        let store = MemoryRelayStore::new();
        let client = RelayClient::new(Arc::new(store.clone()));
        let (a, b) = (DeviceId::new("device-a"), DeviceId::new("device-b"));
        let key_a = SyncKey::generate();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = client
            .subscribe(a.clone(), Duration::ZERO, move |record| {
                let _ = tx.send(record.from_device.clone());
                async { true }
            })
            .unwrap();

        client.publish(&a, &key_a, &payload(), &b).await.unwrap();

        let from = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, b);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn rewrite_during_handling_survives_clear() {
        let store = MemoryRelayStore::new();
        let client = RelayClient::new(Arc::new(store.clone()));
        let (a, b) = (DeviceId::new("device-a"), DeviceId::new("device-b"));
        let first = MailboxRecord {
            data: "first".into(),
            timestamp: 1_700_000_000_000,
            from_device: b.clone(),
        };
        store.write(&a, "h", first.clone()).await.unwrap();

        // Same sender, same millisecond, new content while the first is handled.
        let rewriter = store.clone();
        let target = a.clone();
        let rewrite = MailboxRecord {
            data: "second".into(),
            ..first.clone()
        };
        let consumed = client
            .poll_once(&a, move |_| {
                let (store, target, record) = (rewriter.clone(), target.clone(), rewrite.clone());
                async move {
                    store.write(&target, "h", record).await.unwrap();
                    true
                }
            })
            .await
            .unwrap();

        assert_eq!(consumed, 1);
        let pending = store.pending(&a).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].data, "second");
    }

    #[tokio::test]
    async fn subscription_delivers_new_records() {
        let store = MemoryRelayStore::new();
        let client = RelayClient::new(Arc::new(store.clone()));
        let (a, b) = (DeviceId::new("device-a"), DeviceId::new("device-b"));
        let key_a = SyncKey::generate();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = client
            .subscribe(a.clone(), Duration::from_millis(10), move |record| {
                let _ = tx.send(record.from_device.clone());
                async { true }
            })
            .unwrap();

        client.publish(&a, &key_a, &payload(), &b).await.unwrap();

        let from = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, b);
        handle.abort();
    }
}
