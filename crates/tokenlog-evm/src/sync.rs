//! One-shot backfill: resolve the range, fetch every chunk, persist the
//! grouped transfers.

use tracing::info;

use tokenlog_core::config::SyncConfig;
use tokenlog_core::error::IndexerError;
use tokenlog_core::store::{persist_groups, EventStore, PersistSummary};
use tokenlog_core::types::{BlockRange, BlockTag, EventGroup};

use crate::fetcher::RangeFetcher;
use crate::source::LogSource;

/// Outcome of a [`TransferSync::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// The resolved block range.
    pub range: BlockRange,
    /// Number of `eth_getLogs` chunks issued.
    pub chunks: usize,
    /// Decoded transfer events across all chunks.
    pub events: usize,
    /// Distinct transactions among those events.
    pub groups: usize,
    pub persisted: PersistSummary,
}

/// Fetches transfers for the configured token and writes them to `store`.
pub struct TransferSync<L, S> {
    config: SyncConfig,
    fetcher: RangeFetcher<L>,
    store: S,
}

impl<L: LogSource, S: EventStore> TransferSync<L, S> {
    pub fn new(config: SyncConfig, source: L, store: S) -> Result<Self, IndexerError> {
        config.validate()?;
        let fetcher = RangeFetcher::from_config(source, &config);
        Ok(Self {
            config,
            fetcher,
            store,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &L {
        self.fetcher.source()
    }

    /// Run the backfill once.
    pub async fn run(&self) -> Result<SyncSummary, IndexerError> {
        let from = self.config.from_block;
        let to = self.fetcher.resolve(self.config.to_block).await?;
        let range = BlockRange::new(from, to)?;
        info!(
            chain = %self.config.chain,
            token = %self.config.token_address,
            from,
            to,
            "block range resolved"
        );

        let chunks = self
            .fetcher
            .fetch_range(from, BlockTag::Number(to), self.config.chunk_size)
            .await?;
        let chunk_count = chunks.len();
        let events: usize = chunks.iter().map(Vec::len).sum();

        let groups: EventGroup = chunks.into_iter().flatten().collect();
        info!(chunks = chunk_count, events, groups = groups.len(), "events fetched");

        let persisted = persist_groups(&self.store, &groups).await?;

        Ok(SyncSummary {
            range,
            chunks: chunk_count,
            events,
            groups: groups.len(),
            persisted,
        })
    }
}
