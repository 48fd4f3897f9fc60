//! Local storage seams.
//!
//! The sync subsystem treats local storage as an opaque durable key-value
//! interface ([`KeyValueStore`]). Record collections are reached through
//! the narrower [`RecordStore`] get-all/replace-all interface.
//!
//! # Design
//!
//! - `MemoryKvStore` - in-process store, can be switched unavailable (tests)
//! - `FileKvStore` - one file per key in a data directory (CLI)
//! - `KvRecordStore` - the three collections as JSON arrays in a `KeyValueStore`

mod file;
mod memory;
mod records;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;
pub use records::{load_collections, save_collections, KvRecordStore, RecordStore};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Durable string key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Read and parse a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(StoreError::Serialization)?;
    store.set(key, &raw).await
}
