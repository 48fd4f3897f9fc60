//! The record store consumed by the sync subsystem.

use std::sync::Arc;

use super::{get_json, set_json, KeyValueStore};
use crate::error::StoreError;
use async_trait::async_trait;
use journal_sync_core::Collections;
use journal_sync_types::{ActionItem, Expense, JournalEntry, Record};

/// Get-all/replace-all access to the three local collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All journal entries.
    async fn get_entries(&self) -> Result<Vec<JournalEntry>, StoreError>;
    /// Replace all journal entries.
    async fn save_entries(&self, entries: &[JournalEntry]) -> Result<(), StoreError>;
    /// All expenses.
    async fn get_expenses(&self) -> Result<Vec<Expense>, StoreError>;
    /// Replace all expenses.
    async fn save_expenses(&self, expenses: &[Expense]) -> Result<(), StoreError>;
    /// All action items.
    async fn get_action_items(&self) -> Result<Vec<ActionItem>, StoreError>;
    /// Replace all action items.
    async fn save_action_items(&self, items: &[ActionItem]) -> Result<(), StoreError>;
}

/// Read all three collections.
pub async fn load_collections(store: &dyn RecordStore) -> Result<Collections, StoreError> {
    Ok(Collections {
        entries: store.get_entries().await?,
        expenses: store.get_expenses().await?,
        action_items: store.get_action_items().await?,
    })
}

/// Replace all three collections.
pub async fn save_collections(
    store: &dyn RecordStore,
    collections: &Collections,
) -> Result<(), StoreError> {
    store.save_entries(&collections.entries).await?;
    store.save_expenses(&collections.expenses).await?;
    store.save_action_items(&collections.action_items).await?;
    Ok(())
}

/// [`RecordStore`] keeping each collection as a JSON array in a
/// [`KeyValueStore`], under `entries`, `expenses` and `actionItems`.
#[derive(Clone)]
pub struct KvRecordStore {
    kv: Arc<dyn KeyValueStore>,
}

impl KvRecordStore {
    /// Wrap a key-value store.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    async fn load<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        Ok(get_json(self.kv.as_ref(), R::KIND.collection())
            .await?
            .unwrap_or_default())
    }

    async fn save<R: Record>(&self, records: &[R]) -> Result<(), StoreError> {
        set_json(self.kv.as_ref(), R::KIND.collection(), records).await
    }
}

#[async_trait]
impl RecordStore for KvRecordStore {
    async fn get_entries(&self) -> Result<Vec<JournalEntry>, StoreError> {
        self.load().await
    }

    async fn save_entries(&self, entries: &[JournalEntry]) -> Result<(), StoreError> {
        self.save(entries).await
    }

    async fn get_expenses(&self) -> Result<Vec<Expense>, StoreError> {
        self.load().await
    }

    async fn save_expenses(&self, expenses: &[Expense]) -> Result<(), StoreError> {
        self.save(expenses).await
    }

    async fn get_action_items(&self) -> Result<Vec<ActionItem>, StoreError> {
        self.load().await
    }

    async fn save_action_items(&self, items: &[ActionItem]) -> Result<(), StoreError> {
        self.save(items).await
    }
}
