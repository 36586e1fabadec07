//! SQLite event store for tokenlog.
//!
//! One table per collection, keyed by transaction hash. Each row holds the
//! JSON-encoded transfer list for that transaction and the time it was
//! first written. Rows are never updated.
//!
//! # Usage
//! ```rust,no_run
//! use tokenlog_storage::sqlite::SqliteEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteEventStore::open("./transfers.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteEventStore::in_memory().await?.with_collection("usdc")?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use tokenlog_core::config::DEFAULT_COLLECTION;
use tokenlog_core::error::{IndexerError, StoreError};
use tokenlog_core::store::{EventStore, StoreTransaction};
use tokenlog_core::types::EventRecord;

/// A stored transaction group as read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub transaction_id: String,
    pub records: Vec<EventRecord>,
    /// Unix seconds at which the row was written.
    pub stored_at: i64,
}

/// SQLite-backed [`EventStore`].
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteEventStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./transfers.db"`) or a full
    /// SQLite URL (`"sqlite:./transfers.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(Self {
            pool,
            table: DEFAULT_COLLECTION.to_string(),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `sqlite::memory:` sees its own database, so the
    /// pool is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(Self {
            pool,
            table: DEFAULT_COLLECTION.to_string(),
        })
    }

    /// Use `name` as the collection (table) name.
    pub fn with_collection(mut self, name: &str) -> Result<Self, IndexerError> {
        validate_collection(name)?;
        self.table = name.to_string();
        Ok(self)
    }

    pub fn collection(&self) -> &str {
        &self.table
    }

    /// Number of stored transaction groups.
    pub async fn count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    /// Fetch one stored group by transaction hash.
    pub async fn get_entry(&self, transaction_id: &str) -> Result<Option<StoredEntry>, IndexerError> {
        let row = sqlx::query(&format!(
            "SELECT transaction_id, records_json, stored_at FROM {} WHERE transaction_id = ?",
            self.table
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// Most recently stored groups, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<StoredEntry>, IndexerError> {
        let rows = sqlx::query(&format!(
            "SELECT transaction_id, records_json, stored_at FROM {}
             ORDER BY stored_at DESC, rowid DESC LIMIT ?",
            self.table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<StoredEntry, IndexerError> {
    let json: String = row.get("records_json");
    let records = serde_json::from_str(&json).map_err(|e| IndexerError::Storage(e.to_string()))?;
    Ok(StoredEntry {
        transaction_id: row.get("transaction_id"),
        records,
        stored_at: row.get("stored_at"),
    })
}

/// Collection names are interpolated into SQL, so only plain identifiers pass.
fn validate_collection(name: &str) -> Result<(), IndexerError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(IndexerError::InvalidConfig(format!(
            "invalid collection name {name:?}: use letters, digits and underscores"
        )))
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    type Txn = SqliteTransaction;

    async fn ensure_collection(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                transaction_id TEXT    PRIMARY KEY,
                records_json   TEXT    NOT NULL,
                stored_at      INTEGER NOT NULL
            );",
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn begin(&self) -> Result<SqliteTransaction, IndexerError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        debug!(collection = %self.table, "transaction opened");
        Ok(SqliteTransaction {
            table: self.table.clone(),
            inner: Mutex::new(Some(tx)),
        })
    }
}

/// An open SQLite transaction. Dropping it without [`commit`] rolls back.
///
/// [`commit`]: StoreTransaction::commit
pub struct SqliteTransaction {
    table: String,
    inner: Mutex<Option<Transaction<'static, Sqlite>>>,
}

fn finished() -> StoreError {
    StoreError::Backend("transaction already committed".into())
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn get(&self, key: &str) -> Result<Option<Vec<EventRecord>>, StoreError> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;

        let row = sqlx::query(&format!(
            "SELECT records_json FROM {} WHERE transaction_id = ?",
            self.table
        ))
        .bind(key)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(r) => {
                let json: String = r.get("records_json");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn add(&self, key: &str, records: &[EventRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string(records)?;
        let stored_at = chrono::Utc::now().timestamp();

        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;

        sqlx::query(&format!(
            "INSERT INTO {} (transaction_id, records_json, stored_at) VALUES (?, ?, ?)",
            self.table
        ))
        .bind(key)
        .bind(&json)
        .bind(stored_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateKey(key.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        })?;

        debug!(tx_hash = key, records = records.len(), "entry staged");
        Ok(())
    }

    async fn commit(&self) -> Result<(), IndexerError> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| IndexerError::Commit("transaction already committed".into()))?;
        tx.commit()
            .await
            .map_err(|e| IndexerError::Commit(e.to_string()))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
