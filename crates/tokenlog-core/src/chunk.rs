//! Block-range partitioning for `eth_getLogs` batching.
//!
//! Chunks are inclusive on both ends. Each chunk spans `chunk_size` blocks
//! past its start (so `[start, start + chunk_size]`), and the next chunk
//! begins one block after the previous end. Together they cover `[from, to]`
//! exactly once.

use crate::error::IndexerError;
use crate::types::BlockRange;

/// Split `[from, to]` into retrieval chunks.
///
/// A `from` of zero means "everything up to `to`" and is never split.
pub fn plan_chunks(from: u64, to: u64, chunk_size: u64) -> Result<Vec<BlockRange>, IndexerError> {
    if chunk_size == 0 {
        return Err(IndexerError::InvalidConfig("chunk size must be positive".into()));
    }
    let whole = BlockRange::new(from, to)?;
    if from == 0 || to - from <= chunk_size {
        return Ok(vec![whole]);
    }

    let expected = (to - from) / chunk_size + 1;
    let mut chunks = Vec::with_capacity(expected.min(4096) as usize);
    let mut start = from;
    loop {
        let end = start.saturating_add(chunk_size).min(to);
        chunks.push(BlockRange { from: start, to: end });
        if end == to {
            break;
        }
        start = end + 1;
    }
    Ok(chunks)
}
