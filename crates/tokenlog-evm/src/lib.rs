//! tokenlog-evm: EVM log source, `Transfer` decoder, range fetcher and sync runner.

pub mod builder;
pub mod decoder;
pub mod fetcher;
pub mod rpc;
pub mod source;
pub mod sync;

pub use builder::SyncBuilder;
pub use decoder::{format_units, TransferDecoder};
pub use fetcher::RangeFetcher;
pub use rpc::HttpLogSource;
pub use source::{LogFilter, LogSource, RawLog};
pub use sync::{SyncSummary, TransferSync};
