//! Write-once persistence of transfer groups.
//!
//! A store holds one collection keyed by transaction hash. [`persist`] groups
//! records by transaction, opens a single transaction, and for every key does
//! a point lookup followed by an insert when absent. Failures of individual
//! writes (most commonly a duplicate key lost to a concurrent writer between
//! the lookup and the insert) are logged and swallowed; only a failure of the
//! transaction itself reaches the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{IndexerError, StoreError};
use crate::types::{EventGroup, EventRecord};

/// A durable keyed collection of transfer groups.
#[async_trait]
pub trait EventStore: Send + Sync {
    type Txn: StoreTransaction;

    /// Create the backing collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), IndexerError>;

    /// Open a read-write transaction over the collection.
    async fn begin(&self) -> Result<Self::Txn, IndexerError>;
}

/// A read-write transaction handed out by an [`EventStore`].
///
/// Item operations take `&self` so that many of them can be in flight at
/// once; implementations serialise access to the underlying handle.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Point lookup by transaction hash.
    async fn get(&self, key: &str) -> Result<Option<Vec<EventRecord>>, StoreError>;

    /// Insert a new entry. Must fail with [`StoreError::DuplicateKey`] if the
    /// key is already present.
    async fn add(&self, key: &str, records: &[EventRecord]) -> Result<(), StoreError>;

    /// Commit every successful `add`. Calling it twice is an error.
    async fn commit(&self) -> Result<(), IndexerError>;
}

/// Per-call counts returned by [`persist`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    /// New entries written.
    pub written: usize,
    /// Keys already present (found by lookup or rejected as duplicates).
    pub skipped: usize,
    /// Item writes that failed for any other reason and were suppressed.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    Skipped,
}

async fn write_if_absent<T: StoreTransaction>(
    tx: &T,
    key: &str,
    records: &[EventRecord],
) -> Result<WriteOutcome, StoreError> {
    if tx.get(key).await?.is_some() {
        return Ok(WriteOutcome::Skipped);
    }
    tx.add(key, records).await?;
    Ok(WriteOutcome::Written)
}

/// Group `records` by transaction hash and store every group not yet present.
pub async fn persist<S, I>(store: &S, records: I) -> Result<PersistSummary, IndexerError>
where
    S: EventStore,
    I: IntoIterator<Item = EventRecord>,
{
    let groups: EventGroup = records.into_iter().collect();
    persist_groups(store, &groups).await
}

/// Store every group in `groups` whose key is not yet present, in one transaction.
pub async fn persist_groups<S: EventStore>(
    store: &S,
    groups: &EventGroup,
) -> Result<PersistSummary, IndexerError> {
    store.ensure_collection().await?;
    if groups.is_empty() {
        return Ok(PersistSummary::default());
    }

    let tx = store.begin().await?;
    let tx_ref = &tx;
    let outcomes = join_all(groups.iter().map(|(key, records)| async move {
        (key, write_if_absent(tx_ref, key, records).await)
    }))
    .await;

    let mut summary = PersistSummary::default();
    for (key, outcome) in outcomes {
        match outcome {
            Ok(WriteOutcome::Written) => summary.written += 1,
            Ok(WriteOutcome::Skipped) => {
                debug!(tx_hash = key, "already stored, skipping");
                summary.skipped += 1;
            }
            Err(e) if e.is_duplicate() => {
                debug!(tx_hash = key, "lost insert race, skipping");
                summary.skipped += 1;
            }
            Err(e) => {
                warn!(tx_hash = key, error = %e, "write failed; continuing with remaining items");
                summary.failed += 1;
            }
        }
    }

    tx.commit().await?;

    info!(
        groups = groups.len(),
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed,
        "events persisted"
    );
    Ok(summary)
}

// ─── In-memory store ──────────────────────────────────────────────────────────

type Entries = Arc<Mutex<HashMap<String, Vec<EventRecord>>>>;

/// In-memory event store for tests and dry runs. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    entries: Entries,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed records for `key`.
    pub fn get(&self, key: &str) -> Option<Vec<EventRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    type Txn = MemoryTransaction;

    async fn ensure_collection(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn begin(&self) -> Result<MemoryTransaction, IndexerError> {
        Ok(MemoryTransaction {
            committed: Arc::clone(&self.entries),
            staged: Mutex::new(IndexMap::new()),
            finished: AtomicBool::new(false),
        })
    }
}

/// Transaction over a [`MemoryEventStore`]; writes stay staged until commit.
#[derive(Debug)]
pub struct MemoryTransaction {
    committed: Entries,
    staged: Mutex<IndexMap<String, Vec<EventRecord>>>,
    finished: AtomicBool,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&self, key: &str) -> Result<Option<Vec<EventRecord>>, StoreError> {
        if let Some(staged) = self.staged.lock().unwrap_or_else(|e| e.into_inner()).get(key) {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .committed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn add(&self, key: &str, records: &[EventRecord]) -> Result<(), StoreError> {
        if self.finished.load(Ordering::Acquire) {
            return Err(StoreError::Backend("transaction already finished".into()));
        }
        let committed = self.committed.lock().unwrap_or_else(|e| e.into_inner());
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        if committed.contains_key(key) || staged.contains_key(key) {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }
        staged.insert(key.to_string(), records.to_vec());
        Ok(())
    }

    async fn commit(&self) -> Result<(), IndexerError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(IndexerError::Commit("transaction already finished".into()));
        }
        let staged = std::mem::take(&mut *self.staged.lock().unwrap_or_else(|e| e.into_inner()));
        let mut committed = self.committed.lock().unwrap_or_else(|e| e.into_inner());
        for (key, records) in staged {
            // A concurrent transaction may have committed the key first; keep its value.
            committed.entry(key).or_insert(records);
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
