//! Fluent builder API for sync runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use tokenlog_evm::SyncBuilder;
//!
//! let config = SyncBuilder::new()
//!     .token("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")
//!     .from_block(19_000_000)
//!     .chunk_size(500)
//!     .build_config();
//! ```

use tokenlog_core::config::SyncConfig;
use tokenlog_core::error::IndexerError;
use tokenlog_core::store::EventStore;
use tokenlog_core::types::BlockTag;

use crate::source::LogSource;
use crate::sync::TransferSync;

/// Fluent builder for `SyncConfig`.
#[derive(Default)]
pub struct SyncBuilder {
    config: SyncConfig,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    /// Start from an existing config (e.g. one loaded from JSON).
    pub fn from_config(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    /// Set the token contract address.
    pub fn token(mut self, address: impl Into<String>) -> Self {
        self.config.token_address = address.into();
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// Set the inclusive end block (`BlockTag::Latest` for the chain head).
    pub fn to_block(mut self, tag: impl Into<BlockTag>) -> Self {
        self.config.to_block = tag.into();
        self
    }

    pub fn event_signature(mut self, signature: impl Into<String>) -> Self {
        self.config.event_signature = signature.into();
        self
    }

    /// Append a topic filter after topic0 (`None` matches anything).
    pub fn topic(mut self, topic: Option<String>) -> Self {
        self.config.additional_topics.push(topic);
        self
    }

    pub fn chunk_size(mut self, size: u64) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn decimals(mut self, decimals: u8) -> Self {
        self.config.decimals = decimals;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Build the `SyncConfig`.
    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Validate and build a runnable [`TransferSync`].
    pub fn build<L: LogSource, S: EventStore>(
        self,
        source: L,
        store: S,
    ) -> Result<TransferSync<L, S>, IndexerError> {
        TransferSync::new(self.config, source, store)
    }
}
