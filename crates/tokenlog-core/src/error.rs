//! Error types for the tokenlog pipeline.

use thiserror::Error;

/// Errors that abort a fetch or persist run.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Log retrieval or head lookup failed at the log source.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A raw log did not match the expected event shape.
    #[error("Decode error in tx {tx_hash}: {reason}")]
    Decode { tx_hash: String, reason: String },

    /// The resolved block range is empty (`from > to`).
    #[error("Invalid block range: from {from} is after to {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Schema setup or transaction start failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The store transaction failed to commit.
    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error came from the log source.
    pub fn is_retrieval(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Decode { .. })
    }
}

/// Errors raised by a single read or write inside a store transaction.
///
/// These never abort the enclosing transaction; `persist` records and
/// suppresses them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An entry already exists under this key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}
