//! Shared types for the fetch → group → persist pipeline.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IndexerError;

// ─── BlockTag ─────────────────────────────────────────────────────────────────

/// Upper bound of a requested range: a concrete height or the chain head.
///
/// Serialized as a bare integer or the string `"latest"`; decimal strings
/// such as `"4700000"` are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Number(u64),
    /// Resolved to the current head once per top-level call.
    Latest,
}

impl Default for BlockTag {
    fn default() -> Self {
        Self::Latest
    }
}

impl From<u64> for BlockTag {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl FromStr for BlockTag {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.parse::<u64>()
            .map(Self::Number)
            .map_err(|_| IndexerError::InvalidConfig(format!("invalid block tag: {s}")))
    }
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_u64(*n),
            Self::Latest => serializer.serialize_str("latest"),
        }
    }
}

impl<'de> Deserialize<'de> for BlockTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::Number(n)),
            Raw::Text(s) => s.parse::<Self>().map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Latest => write!(f, "latest"),
        }
    }
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive block interval `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Build a range, rejecting `from > to`.
    pub fn new(from: u64, to: u64) -> Result<Self, IndexerError> {
        if from > to {
            return Err(IndexerError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Number of blocks covered (both ends inclusive).
    pub fn block_count(&self) -> u64 {
        (self.to - self.from).saturating_add(1)
    }

    pub fn contains(&self, block: u64) -> bool {
        (self.from..=self.to).contains(&block)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ─── EventRecord ──────────────────────────────────────────────────────────────

/// One decoded `Transfer` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Sender address (`0x…`, lowercase).
    pub source: String,
    /// Recipient address (`0x…`, lowercase).
    pub destination: String,
    /// Transferred amount as a decimal string (e.g. `"1.5"`).
    pub amount: String,
    /// Hash of the transaction that emitted the log.
    pub transaction_id: String,
}

// ─── EventGroup ───────────────────────────────────────────────────────────────

/// Records keyed by transaction hash.
///
/// Keys keep first-seen order and each key keeps its records in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGroup {
    groups: IndexMap<String, Vec<EventRecord>>,
}

impl EventGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record under its transaction id.
    pub fn push(&mut self, record: EventRecord) {
        self.groups
            .entry(record.transaction_id.clone())
            .or_default()
            .push(record);
    }

    pub fn get(&self, transaction_id: &str) -> Option<&[EventRecord]> {
        self.groups.get(transaction_id).map(Vec::as_slice)
    }

    /// Number of distinct transaction ids.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of records across all groups.
    pub fn record_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EventRecord])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FromIterator<EventRecord> for EventGroup {
    fn from_iter<I: IntoIterator<Item = EventRecord>>(iter: I) -> Self {
        let mut group = Self::new();
        for record in iter {
            group.push(record);
        }
        group
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
