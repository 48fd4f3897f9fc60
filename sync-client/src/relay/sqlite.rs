//! SQLite relay store.
//!
//! Lets devices on one machine (or sharing one database file) hand off
//! sync payloads. [`SqliteRelayStore::open`] provisions the schema;
//! [`SqliteRelayStore::connect_existing`] does not, and a store opened
//! that way reports `NotProvisioned` until someone provisions it.

use super::RelayStore;
use crate::error::RelayError;
use async_trait::async_trait;
use chrono::Utc;
use journal_sync_types::{DeviceId, MailboxRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed relay store.
///
/// Uses WAL mode so several processes can share the file.
#[derive(Clone)]
pub struct SqliteRelayStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    from_device: String,
    data: String,
    timestamp: i64,
}

impl From<MessageRow> for MailboxRecord {
    fn from(row: MessageRow) -> Self {
        MailboxRecord {
            data: row.data,
            timestamp: row.timestamp,
            from_device: DeviceId::new(row.from_device),
        }
    }
}

impl SqliteRelayStore {
    /// Open (creating if needed) and provision a relay database.
    pub async fn open(path: &Path) -> Result<Self, RelayError> {
        let store = Self::connect(path, true).await?;
        store.provision().await?;
        Ok(store)
    }

    /// Open an existing relay database without touching its schema.
    ///
    /// A missing file is `NotProvisioned`; other failures pass through.
    pub async fn connect_existing(path: &Path) -> Result<Self, RelayError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| RelayError::Backend(format!("{}: {}", path.display(), e)))?;
        if !exists {
            return Err(RelayError::NotProvisioned);
        }
        Self::connect(path, false).await
    }

    /// Create a provisioned in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, RelayError> {
        let options = SqliteConnectOptions::from_str(":memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.provision().await?;
        Ok(store)
    }

    async fn connect(path: &Path, create: bool) -> Result<Self, RelayError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create the relay tables.
    pub async fn provision(&self) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mailboxes (
                target TEXT PRIMARY KEY,
                key_hash TEXT NOT NULL,
                claimed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                target TEXT NOT NULL,
                from_device TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (target, from_device)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Claim the mailbox if unclaimed, then check the presented key.
    async fn authorize(&self, target: &DeviceId, key_hash: &str) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            INSERT INTO mailboxes (target, key_hash, claimed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(target) DO NOTHING
            "#,
        )
        .bind(target.as_str())
        .bind(key_hash)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        let owner_hash: String =
            sqlx::query_scalar("SELECT key_hash FROM mailboxes WHERE target = ?1")
                .bind(target.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_error)?;

        if owner_hash != key_hash {
            return Err(RelayError::PermissionDenied {
                target: target.clone(),
            });
        }
        Ok(())
    }
}

/// A missing table means the schema was never provisioned.
fn map_db_error(err: sqlx::Error) -> RelayError {
    if let sqlx::Error::Database(db) = &err {
        if db.message().contains("no such table") {
            return RelayError::NotProvisioned;
        }
    }
    RelayError::Database(err)
}

#[async_trait]
impl RelayStore for SqliteRelayStore {
    async fn claim(&self, owner: &DeviceId, key_hash: &str) -> Result<(), RelayError> {
        self.authorize(owner, key_hash).await
    }

    async fn write(
        &self,
        target: &DeviceId,
        key_hash: &str,
        record: MailboxRecord,
    ) -> Result<(), RelayError> {
        self.authorize(target, key_hash).await?;

        sqlx::query(
            r#"
            INSERT INTO messages (target, from_device, data, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(target, from_device) DO UPDATE
                SET data = excluded.data, timestamp = excluded.timestamp
            "#,
        )
        .bind(target.as_str())
        .bind(record.from_device.as_str())
        .bind(&record.data)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn pending(&self, target: &DeviceId) -> Result<Vec<MailboxRecord>, RelayError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT from_device, data, timestamp
            FROM messages
            WHERE target = ?1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(MailboxRecord::from).collect())
    }

    async fn clear(&self, target: &DeviceId, record: &MailboxRecord) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            DELETE FROM messages
            WHERE target = ?1 AND from_device = ?2 AND timestamp = ?3 AND data = ?4
            "#,
        )
        .bind(target.as_str())
        .bind(record.from_device.as_str())
        .bind(record.timestamp)
        .bind(&record.data)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }
}
