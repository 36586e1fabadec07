//! The log-source boundary: raw `eth_getLogs` records and the trait that
//! produces them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tokenlog_core::error::IndexerError;
use tokenlog_core::types::BlockRange;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Block number, if the log is mined.
    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_hex_u64)
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Parameters of one `eth_getLogs` call. Both block bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub address: String,
    /// `topics[0]` is the event signature hash; `None` matches anything.
    pub topics: Vec<Option<String>>,
}

impl LogFilter {
    pub fn new(range: BlockRange, address: impl Into<String>, topics: Vec<Option<String>>) -> Self {
        Self {
            from_block: range.from,
            to_block: range.to,
            address: address.into(),
            topics,
        }
    }

    pub fn range(&self) -> BlockRange {
        BlockRange {
            from: self.from_block,
            to: self.to_block,
        }
    }

    /// The JSON-RPC filter object.
    pub fn to_json(&self) -> Value {
        json!({
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
            "address": self.address,
            "topics": self.topics,
        })
    }
}

/// Anything that can answer `eth_blockNumber` and `eth_getLogs`.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> Result<u64, IndexerError>;

    /// All logs matching `filter`.
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, IndexerError>;
}

#[async_trait]
impl<T: LogSource + ?Sized> LogSource for Arc<T> {
    async fn block_number(&self) -> Result<u64, IndexerError> {
        (**self).block_number().await
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, IndexerError> {
        (**self).logs(filter).await
    }
}

/// Parse a hex quantity (with or without `0x`).
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}
