//! tokenlog-storage: durable backends for tokenlog.
//!
//! Backends:
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//!
//! The in-memory store used by tests lives in `tokenlog_core::store`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteEventStore, SqliteTransaction, StoredEntry};
