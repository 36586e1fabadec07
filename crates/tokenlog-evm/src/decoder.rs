//! Decodes ERC-20 `Transfer` logs into [`EventRecord`]s.
//!
//! Shape: `Transfer(address indexed from, address indexed to, uint256 value)`.
//! `from` and `to` sit in `topics[1]` and `topics[2]`, `value` is the single
//! 32-byte word of `data`. Addresses are rendered in EIP-55 checksum form.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{keccak256, B256, U256};

use tokenlog_core::error::IndexerError;
use tokenlog_core::types::EventRecord;

use crate::source::RawLog;

/// Decoder for one fixed event signature.
#[derive(Debug, Clone)]
pub struct TransferDecoder {
    topic0: B256,
    decimals: u8,
}

impl TransferDecoder {
    /// `signature` is the canonical event signature, e.g.
    /// `"Transfer(address,address,uint256)"`.
    pub fn new(signature: &str, decimals: u8) -> Self {
        Self {
            topic0: keccak256(signature.as_bytes()),
            decimals,
        }
    }

    /// `topics[0]` as a `0x`-prefixed lowercase hex string.
    pub fn topic0_hex(&self) -> String {
        format!("{:#x}", self.topic0)
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Decode one raw log.
    pub fn decode(&self, log: &RawLog) -> Result<EventRecord, IndexerError> {
        let tx_hash = log
            .transaction_hash
            .clone()
            .ok_or_else(|| decode_error("<pending>", "log has no transactionHash"))?;

        if log.topics.len() != 3 {
            return Err(decode_error(
                &tx_hash,
                format!("expected 3 topics, got {}", log.topics.len()),
            ));
        }
        let topic0 = topic_bytes(&tx_hash, &log.topics[0])?;
        if B256::from_slice(&topic0) != self.topic0 {
            return Err(decode_error(&tx_hash, format!("unexpected topic0 {}", log.topics[0])));
        }

        let source = decode_address(&tx_hash, &log.topics[1])?;
        let destination = decode_address(&tx_hash, &log.topics[2])?;
        let amount = decode_amount(&tx_hash, &log.data)?;

        Ok(EventRecord {
            source,
            destination,
            amount: format_units(amount, self.decimals),
            transaction_id: tx_hash,
        })
    }
}

fn decode_error(tx_hash: &str, reason: impl Into<String>) -> IndexerError {
    IndexerError::Decode {
        tx_hash: tx_hash.to_string(),
        reason: reason.into(),
    }
}

fn topic_bytes(tx_hash: &str, topic_hex: &str) -> Result<Vec<u8>, IndexerError> {
    let hex = topic_hex.strip_prefix("0x").unwrap_or(topic_hex);
    let bytes = hex::decode(hex).map_err(|e| decode_error(tx_hash, format!("invalid topic hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(decode_error(
            tx_hash,
            format!("topic must be 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(bytes)
}

fn decode_address(tx_hash: &str, topic_hex: &str) -> Result<String, IndexerError> {
    let bytes = topic_bytes(tx_hash, topic_hex)?;
    match DynSolType::Address.abi_decode(&bytes) {
        Ok(DynSolValue::Address(a)) => Ok(a.to_checksum(None)),
        Ok(other) => Err(decode_error(tx_hash, format!("expected address, got {other:?}"))),
        Err(e) => Err(decode_error(tx_hash, format!("address decode: {e}"))),
    }
}

fn decode_amount(tx_hash: &str, data_hex: &str) -> Result<U256, IndexerError> {
    let hex = data_hex.strip_prefix("0x").unwrap_or(data_hex);
    let bytes = hex::decode(hex).map_err(|e| decode_error(tx_hash, format!("invalid data hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(decode_error(
            tx_hash,
            format!("data must be one 32-byte word, got {} bytes", bytes.len()),
        ));
    }
    match DynSolType::Uint(256).abi_decode(&bytes) {
        Ok(DynSolValue::Uint(u, _)) => Ok(u),
        Ok(other) => Err(decode_error(tx_hash, format!("expected uint256, got {other:?}"))),
        Err(e) => Err(decode_error(tx_hash, format!("amount decode: {e}"))),
    }
}

/// Format a base-unit integer as a decimal string with `decimals` places.
///
/// Trailing fractional zeros are trimmed but one fractional digit is always
/// kept: `1.5e18 → "1.5"`, `1e18 → "1.0"`, `0 → "0.0"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;

    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        format!("{int_part}.0")
    } else {
        format!("{int_part}.{frac}")
    }
}
