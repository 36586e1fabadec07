//! Chunked, concurrent `eth_getLogs` retrieval.
//!
//! [`RangeFetcher::fetch_range`] resolves the upper bound once, splits the
//! range with [`plan_chunks`], and runs one request per chunk with at most
//! `max_concurrency` in flight. Results come back in chunk order no matter
//! which request finishes first; the first failing chunk fails the call.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use tokenlog_core::chunk::plan_chunks;
use tokenlog_core::config::SyncConfig;
use tokenlog_core::error::IndexerError;
use tokenlog_core::types::{BlockRange, BlockTag, EventRecord};

use crate::decoder::TransferDecoder;
use crate::source::{LogFilter, LogSource};

/// Fetches and decodes `Transfer` logs for one contract.
pub struct RangeFetcher<L> {
    source: L,
    decoder: TransferDecoder,
    address: String,
    additional_topics: Vec<Option<String>>,
    max_concurrency: usize,
}

impl<L: LogSource> RangeFetcher<L> {
    pub fn new(source: L, address: impl Into<String>, decoder: TransferDecoder) -> Self {
        Self {
            source,
            decoder,
            address: address.into(),
            additional_topics: Vec::new(),
            max_concurrency: 8,
        }
    }

    /// Build a fetcher from the relevant [`SyncConfig`] fields.
    pub fn from_config(source: L, config: &SyncConfig) -> Self {
        Self::new(
            source,
            config.token_address.clone(),
            TransferDecoder::new(&config.event_signature, config.decimals),
        )
        .additional_topics(config.additional_topics.clone())
        .max_concurrency(config.max_concurrency)
    }

    /// Topic filters appended after the event signature hash.
    pub fn additional_topics(mut self, topics: Vec<Option<String>>) -> Self {
        self.additional_topics = topics;
        self
    }

    /// Cap on concurrent chunk requests (at least 1).
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    /// Turn a [`BlockTag`] into a concrete height.
    pub async fn resolve(&self, tag: BlockTag) -> Result<u64, IndexerError> {
        match tag {
            BlockTag::Number(n) => Ok(n),
            BlockTag::Latest => self.source.block_number().await,
        }
    }

    /// The filter sent for `range`.
    pub fn filter_for(&self, range: BlockRange) -> LogFilter {
        let mut topics = Vec::with_capacity(1 + self.additional_topics.len());
        topics.push(Some(self.decoder.topic0_hex()));
        topics.extend(self.additional_topics.iter().cloned());
        LogFilter::new(range, self.address.clone(), topics)
    }

    /// Fetch `[from, to]` in chunks; one inner `Vec` per chunk, in chunk order.
    pub async fn fetch_range(
        &self,
        from: u64,
        to: BlockTag,
        chunk_size: u64,
    ) -> Result<Vec<Vec<EventRecord>>, IndexerError> {
        if chunk_size == 0 {
            return Err(IndexerError::InvalidConfig("chunk size must be positive".into()));
        }
        let to = self.resolve(to).await?;
        let chunks = plan_chunks(from, to, chunk_size)?;
        debug!(from, to, chunks = chunks.len(), chunk_size, "fetching block range");

        stream::iter(chunks.into_iter().map(|range| self.fetch_chunk(range)))
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    /// Fetch and decode a single chunk.
    pub async fn fetch_chunk(&self, range: BlockRange) -> Result<Vec<EventRecord>, IndexerError> {
        let filter = self.filter_for(range);
        let logs = self.source.logs(&filter).await?;

        let records = logs
            .iter()
            .filter(|log| !log.is_removed())
            .map(|log| self.decoder.decode(log))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(from = range.from, to = range.to, logs = records.len(), "chunk fetched");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokenlog_core::config::TRANSFER_SIGNATURE;

    use crate::source::RawLog;

    const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const TRANSFER_TOPIC: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

    fn topic_addr(n: u8) -> String {
        format!("0x{:064x}", n)
    }

    /// One transfer log per block in `blocks`, tx hash derived from the block.
    fn log_at(block: u64) -> RawLog {
        RawLog {
            address: TOKEN.into(),
            topics: vec![TRANSFER_TOPIC.into(), topic_addr(1), topic_addr(2)],
            data: format!("0x{:064x}", block as u128 * 1_000_000_000_000_000_000),
            block_number: Some(format!("0x{block:x}")),
            block_hash: None,
            transaction_hash: Some(format!("0x{block:064x}")),
            log_index: Some("0x0".into()),
            removed: None,
        }
    }

    #[derive(Default)]
    struct FakeSource {
        head: u64,
        logs: Vec<RawLog>,
        fail_containing: Option<u64>,
        head_calls: AtomicUsize,
        filters: Mutex<Vec<LogFilter>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl LogSource for FakeSource {
        async fn block_number(&self) -> Result<u64, IndexerError> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.head)
        }

        async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, IndexerError> {
            self.filters.lock().unwrap().push(filter.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            // Earlier chunks finish later.
            let delay = 50u64.saturating_sub(filter.from_block / 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(bad) = self.fail_containing {
                if filter.range().contains(bad) {
                    return Err(IndexerError::Rpc("query returned more than 10000 results".into()));
                }
            }
            Ok(self
                .logs
                .iter()
                .filter(|l| filter.range().contains(l.block_number_u64().unwrap()))
                .cloned()
                .collect())
        }
    }

    fn fetcher(source: FakeSource) -> RangeFetcher<FakeSource> {
        RangeFetcher::new(source, TOKEN, TransferDecoder::new(TRANSFER_SIGNATURE, 18))
    }

    #[tokio::test]
    async fn results_follow_chunk_order() {
        let source = FakeSource {
            logs: (1..=40).map(log_at).collect(),
            ..Default::default()
        };
        let f = fetcher(source).max_concurrency(16);

        let chunks = f.fetch_range(1, BlockTag::Number(40), 4).await.unwrap();

        assert_eq!(chunks.len(), 8); // [1,5] [6,10] … [36,40]
        let amounts: Vec<String> = chunks.into_iter().flatten().map(|r| r.amount).collect();
        let expected: Vec<String> = (1..=40).map(|b| format!("{b}.0")).collect();
        assert_eq!(amounts, expected);
    }

    #[tokio::test]
    async fn latest_is_resolved_once() {
        let source = FakeSource {
            head: 5100,
            ..Default::default()
        };
        let f = fetcher(source);

        let chunks = f.fetch_range(100, BlockTag::Latest, 2000).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(f.source().head_calls.load(Ordering::SeqCst), 1);
        let mut ranges: Vec<_> = f.source().filters.lock().unwrap().iter().map(|f| f.range()).collect();
        ranges.sort_by_key(|r| r.from);
        assert_eq!(
            ranges,
            vec![
                BlockRange { from: 100, to: 2100 },
                BlockRange { from: 2101, to: 4101 },
                BlockRange { from: 4102, to: 5100 },
            ]
        );
    }

    #[tokio::test]
    async fn zero_start_with_latest_is_a_single_request() {
        let source = FakeSource {
            head: 19_000_000,
            ..Default::default()
        };
        let f = fetcher(source);

        let chunks = f.fetch_range(0, BlockTag::Latest, 10).await.unwrap();

        assert_eq!(chunks.len(), 1);
        let filters = f.source().filters.lock().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].range(), BlockRange { from: 0, to: 19_000_000 });
    }

    #[tokio::test]
    async fn filter_carries_address_and_topics() {
        let f = fetcher(FakeSource::default())
            .additional_topics(vec![None, Some(topic_addr(2))]);

        f.fetch_range(7, BlockTag::Number(7), 2000).await.unwrap();

        let filters = f.source().filters.lock().unwrap();
        assert_eq!(filters[0].address, TOKEN);
        assert_eq!(
            filters[0].topics,
            vec![Some(TRANSFER_TOPIC.to_string()), None, Some(topic_addr(2))]
        );
        assert_eq!(filters[0].range(), BlockRange { from: 7, to: 7 });
    }

    #[tokio::test]
    async fn one_failing_chunk_fails_the_call() {
        let source = FakeSource {
            logs: (1..=40).map(log_at).collect(),
            fail_containing: Some(23),
            ..Default::default()
        };
        let f = fetcher(source);

        let err = f.fetch_range(1, BlockTag::Number(40), 4).await.unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(_)));
    }

    #[tokio::test]
    async fn undecodable_log_fails_the_call() {
        let mut bad = log_at(3);
        bad.data = "0x1234".into();
        let source = FakeSource {
            logs: vec![log_at(1), bad],
            ..Default::default()
        };
        let f = fetcher(source);

        let err = f.fetch_range(1, BlockTag::Number(10), 100).await.unwrap_err();
        assert!(matches!(err, IndexerError::Decode { .. }));
    }

    #[tokio::test]
    async fn removed_logs_are_skipped() {
        let mut removed = log_at(2);
        removed.removed = Some(true);
        let source = FakeSource {
            logs: vec![log_at(1), removed],
            ..Default::default()
        };
        let f = fetcher(source);

        let chunks = f.fetch_range(1, BlockTag::Number(2), 100).await.unwrap();
        assert_eq!(chunks[0].len(), 1);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected_before_any_request() {
        let f = fetcher(FakeSource::default());
        let err = f.fetch_range(1, BlockTag::Latest, 0).await.unwrap_err();
        assert!(matches!(err, IndexerError::InvalidConfig(_)));
        assert_eq!(f.source().head_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrency_is_capped() {
        let f = fetcher(FakeSource::default()).max_concurrency(3);
        f.fetch_range(1, BlockTag::Number(100), 4).await.unwrap();

        let max = f.source().max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
        assert!(max >= 2, "requests never overlapped");
    }

    #[tokio::test]
    async fn requests_overlap_when_uncapped() {
        let f = fetcher(FakeSource::default()).max_concurrency(64);
        f.fetch_range(1, BlockTag::Number(100), 4).await.unwrap();
        assert!(f.source().max_in_flight.load(Ordering::SeqCst) > 3);
    }
}
