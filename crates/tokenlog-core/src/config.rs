//! Sync configuration.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::BlockTag;

/// Canonical ERC-20 `Transfer` signature.
pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";

/// Default number of blocks past a chunk's start covered by one `eth_getLogs` call.
pub const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Default collection (table) name for stored transfer groups.
pub const DEFAULT_COLLECTION: &str = "events";

/// Configuration for one backfill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chain slug, used only for log context (e.g. `"ethereum"`).
    pub chain: String,
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Token contract emitting the events.
    pub token_address: String,
    /// First block to fetch. `0` fetches everything in one request.
    pub from_block: u64,
    /// Last block to fetch (inclusive).
    pub to_block: BlockTag,
    /// Event signature hashed into topic0.
    pub event_signature: String,
    /// Extra topic filters after topic0; `None` matches any value.
    pub additional_topics: Vec<Option<String>>,
    /// Blocks per chunk (see [`crate::chunk::plan_chunks`]).
    pub chunk_size: u64,
    /// Token decimals used to format amounts.
    pub decimals: u8,
    /// Maximum chunk requests in flight at once.
    pub max_concurrency: usize,
    /// Collection the transfer groups are stored in.
    pub collection: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chain: "ethereum".into(),
            rpc_url: String::new(),
            token_address: String::new(),
            from_block: 0,
            to_block: BlockTag::Latest,
            event_signature: TRANSFER_SIGNATURE.into(),
            additional_topics: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            decimals: 18,
            max_concurrency: 8,
            collection: DEFAULT_COLLECTION.into(),
        }
    }
}

impl SyncConfig {
    /// Check the settings that cannot be caught at the RPC boundary.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.chunk_size == 0 {
            return Err(IndexerError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(IndexerError::InvalidConfig(
                "max_concurrency must be positive".into(),
            ));
        }
        if self.token_address.trim().is_empty() {
            return Err(IndexerError::InvalidConfig("token_address is required".into()));
        }
        if self.event_signature.trim().is_empty() {
            return Err(IndexerError::InvalidConfig("event_signature is required".into()));
        }
        if let BlockTag::Number(to) = self.to_block {
            if to < self.from_block {
                return Err(IndexerError::InvalidRange {
                    from: self.from_block,
                    to,
                });
            }
        }
        Ok(())
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, IndexerError> {
        serde_json::from_str(json).map_err(|e| IndexerError::InvalidConfig(e.to_string()))
    }
}
