//! Durable key/value record store

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::Connection;
use tokio::sync::Mutex;

use super::Database;
use crate::error::{Error, Result};
use crate::models::StorageEstimate;

/// Read-modify-write step for [`RecordStore::update`].
///
/// Receives the current values of the requested keys, in order, and returns
/// the entries to write. An empty result writes nothing.
pub type RecordUpdate<'a> =
    Box<dyn FnOnce(Vec<Option<String>>) -> Result<Vec<(String, String)>> + Send + 'a>;

/// Durable key → value persistence shared by the queue and the dispatcher.
///
/// Implementations must make `write_batch` and `update` atomic: either every
/// entry is durably stored when they return `Ok`, or none is. `update` must
/// also exclude every other writer of the same store, including other
/// processes, between its read and its write.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomically store every `(key, value)` pair
    async fn write_batch(&self, entries: &[(&str, String)]) -> Result<()>;

    /// Read `keys`, hand them to `apply` and write its result in one transaction
    async fn update(&self, keys: &[&str], apply: RecordUpdate<'_>) -> Result<()>;

    /// Remove the given keys; missing keys are ignored
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Quota consumption, or `None` when the store has no notion of a quota
    async fn usage(&self) -> Result<Option<StorageEstimate>>;

    /// Store a single value
    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.write_batch(&[(key, value)]).await
    }
}

/// libSQL implementation of `RecordStore`
#[derive(Clone)]
pub struct LibSqlRecordStore {
    db: Arc<Mutex<Database>>,
    quota: Option<u64>,
}

impl LibSqlRecordStore {
    /// Wrap an already opened database
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            quota: None,
        }
    }

    /// Open (or create) a store backed by the file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory store (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// Reject writes that would grow the stored records past `bytes`
    #[must_use]
    pub const fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub const fn quota(&self) -> Option<u64> {
        self.quota
    }

    async fn sizes_by_key(conn: &Connection) -> Result<Vec<(String, u64)>> {
        let mut rows = conn
            .query(
                "SELECT key, LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB)) FROM records",
                (),
            )
            .await?;

        let mut sizes = Vec::new();
        while let Some(row) = rows.next().await? {
            let key: String = row.get(0)?;
            let size: i64 = row.get(1)?;
            sizes.push((key, u64::try_from(size).unwrap_or_default()));
        }
        Ok(sizes)
    }

    fn check_quota<K: AsRef<str>>(
        quota: u64,
        existing: &[(String, u64)],
        entries: &[(K, String)],
    ) -> Result<()> {
        let untouched: u64 = existing
            .iter()
            .filter(|(key, _)| !entries.iter().any(|(entry_key, _)| entry_key.as_ref() == key))
            .map(|(_, size)| size)
            .sum();
        let incoming: u64 = entries
            .iter()
            .map(|(key, value)| (key.as_ref().len() + value.len()) as u64)
            .sum();

        let required = untouched.saturating_add(incoming);
        if required > quota {
            return Err(Error::QuotaExceeded { required, quota });
        }
        Ok(())
    }

    async fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
        let mut rows = conn
            .query("SELECT value FROM records WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Quota check plus inserts; the caller owns the surrounding transaction
    async fn write_entries<K: AsRef<str> + Sync>(
        &self,
        conn: &Connection,
        entries: &[(K, String)],
    ) -> Result<()> {
        if let Some(quota) = self.quota {
            let existing = Self::sizes_by_key(conn).await?;
            Self::check_quota(quota, &existing, entries)?;
        }

        let now = crate::util::unix_timestamp_now_ms();
        for (key, value) in entries {
            conn.execute(
                "INSERT OR REPLACE INTO records (key, value, updated_at) VALUES (?, ?, ?)",
                libsql::params![key.as_ref(), value.as_str(), now],
            )
            .await?;
        }
        Ok(())
    }

    async fn finish(conn: &Connection, result: Result<()>) -> Result<()> {
        if let Err(e) = result {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }
        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        Self::read_value(db.connection(), key).await
    }

    async fn write_batch(&self, entries: &[(&str, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.write_entries(conn, entries).await;
        Self::finish(conn, result).await
    }

    async fn update(&self, keys: &[&str], apply: RecordUpdate<'_>) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        // IMMEDIATE holds the database write lock from the first read until COMMIT.
        conn.execute("BEGIN IMMEDIATE", ()).await?;

        let result: Result<()> = async {
            let mut current = Vec::with_capacity(keys.len());
            for key in keys {
                current.push(Self::read_value(conn, key).await?);
            }
            let entries = apply(current)?;
            if entries.is_empty() {
                return Ok(());
            }
            self.write_entries(conn, entries.as_slice()).await
        }
        .await;
        Self::finish(conn, result).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;

        let result: Result<()> = async {
            for key in keys {
                conn.execute("DELETE FROM records WHERE key = ?", [*key])
                    .await?;
            }
            Ok(())
        }
        .await;
        Self::finish(conn, result).await
    }

    async fn usage(&self) -> Result<Option<StorageEstimate>> {
        let Some(quota) = self.quota else {
            return Ok(None);
        };

        let db = self.db.lock().await;
        let used = Self::sizes_by_key(db.connection())
            .await?
            .iter()
            .map(|(_, size)| size)
            .sum();
        Ok(Some(StorageEstimate { used, quota }))
    }
}
