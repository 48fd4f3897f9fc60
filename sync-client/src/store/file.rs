//! File-backed key-value store.
//!
//! Each key is one file in the data directory. Keys made only of
//! `[A-Za-z0-9._-]` are used as file names directly; anything else is
//! hex-encoded behind an `x-` prefix so a key can never escape the
//! directory. Files are written with 0600 permissions on Unix since
//! some of them hold sync keys.
//!
//! Writes go to a temp file that is renamed into place, so a reader
//! sees either the old value or the new one.

use super::KeyValueStore;
use crate::error::StoreError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const EXTENSION: &str = "json";
const HEX_PREFIX: &str = "x-";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Key-value store keeping one file per key.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Use `dir` as the store directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(key), EXTENSION))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(
            ".{}.{}-{}.{}",
            file_stem(key),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ))
    }
}

fn file_stem(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with(HEX_PREFIX)
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if plain {
        key.to_string()
    } else {
        format!("{}{}", HEX_PREFIX, hex::encode(key.as_bytes()))
    }
}

fn key_from_stem(stem: &str) -> Option<String> {
    match stem.strip_prefix(HEX_PREFIX) {
        Some(encoded) => hex::decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok()),
        None => Some(stem.to_string()),
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let temp_path = self.temp_path_for(key);
        tokio::fs::write(&temp_path, value).await?;

        let written = async {
            set_file_permissions_0600(&temp_path).await?;
            tokio::fs::rename(&temp_path, self.path_for(key)).await?;
            Ok::<(), StoreError>(())
        }
        .await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        written
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(key_from_stem)
            else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn values_survive_a_new_handle() {
        let temp = TempDir::new().unwrap();
        FileKvStore::new(temp.path())
            .set("device_id", "device-1")
            .await
            .unwrap();

        let reopened = FileKvStore::new(temp.path());
        assert_eq!(
            reopened.get("device_id").await.unwrap().as_deref(),
            Some("device-1")
        );
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::new(temp.path().join("not-yet"));

        assert!(store.get("anything").await.unwrap().is_none());
        assert!(store.keys_with_prefix("").await.unwrap().is_empty());
        store.remove("anything").await.unwrap();
    }

    #[tokio::test]
    async fn unusual_keys_stay_inside_the_directory() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::new(temp.path());

        store.set("../escape/me", "x").await.unwrap();
        store.set("sync-key.device-9", "k").await.unwrap();

        assert!(!temp.path().parent().unwrap().join("escape").exists());
        assert_eq!(store.get("../escape/me").await.unwrap().as_deref(), Some("x"));

        let keys = store.keys_with_prefix("").await.unwrap();
        assert!(keys.contains(&"../escape/me".to_string()));
        assert!(keys.contains(&"sync-key.device-9".to_string()));
    }

    #[tokio::test]
    async fn overwrite_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::new(temp.path());
        store.set("entries", "[1]").await.unwrap();
        store.set("entries", "[1,2]").await.unwrap();

        assert_eq!(store.get("entries").await.unwrap().as_deref(), Some("[1,2]"));
        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["entries.json".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_readers_never_see_partial_values() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::new(temp.path());
        let small = "[]".to_string();
        let large = format!("[{}]", vec!["1"; 50_000].join(","));
        store.set("entries", &small).await.unwrap();

        let writer = {
            let store = store.clone();
            let (small, large) = (small.clone(), large.clone());
            tokio::spawn(async move {
                for i in 0..20 {
                    let value = if i % 2 == 0 { &large } else { &small };
                    store.set("entries", value).await.unwrap();
                }
            })
        };
        for _ in 0..50 {
            let value = store.get("entries").await.unwrap().unwrap();
            assert!(value == small || value == large);
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn remove_deletes_the_file() {
        let temp = TempDir::new().unwrap();
        let store = FileKvStore::new(temp.path());
        store.set("entries", "[]").await.unwrap();
        store.remove("entries").await.unwrap();

        assert!(!temp.path().join("entries.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = FileKvStore::new(temp.path());
        store.set("sync_key", "secret").await.unwrap();

        let mode = std::fs::metadata(temp.path().join("sync_key.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
