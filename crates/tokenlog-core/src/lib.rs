//! tokenlog-core: chunk planning, event grouping and write-once persistence.
//!
//! # Architecture
//!
//! ```text
//! SyncConfig → plan_chunks → (log source, per chunk) → Vec<EventRecord>
//!                                                         │
//!                                            EventGroup (by tx hash)
//!                                                         │
//!                                   persist → EventStore (one transaction)
//! ```
//!
//! Log retrieval lives in `tokenlog-evm`; durable backends in
//! `tokenlog-storage`.

pub mod chunk;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use chunk::plan_chunks;
pub use config::SyncConfig;
pub use error::{IndexerError, StoreError};
pub use store::{
    persist, persist_groups, EventStore, MemoryEventStore, PersistSummary, StoreTransaction,
};
pub use types::{BlockRange, BlockTag, EventGroup, EventRecord};
