use crate::error::LedgerError;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, U256};
use serde::Deserialize;
use std::str::FromStr;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Anything above this is read as milliseconds rather than seconds.
const MILLISECOND_THRESHOLD: u64 = 100_000_000_000;

/// A single ERC-20 transfer, positioned in canonical chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl TransferEvent {
    pub fn new(from: Address, to: Address, value: U256, timestamp: u64) -> Self {
        Self {
            from,
            to,
            value,
            timestamp,
            block_number: 0,
            log_index: 0,
            transaction_hash: B256::ZERO,
        }
    }

    pub fn at(mut self, block_number: u64, log_index: u64) -> Self {
        self.block_number = block_number;
        self.log_index = log_index;
        self
    }

    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }

    pub fn is_burn(&self) -> bool {
        self.to == Address::ZERO
    }

    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// Build an event from a JSON-RPC log. The block timestamp is passed in
    /// because most nodes leave `block_timestamp` empty on `eth_getLogs`.
    pub fn from_log(log: &Log, timestamp: u64) -> anyhow::Result<Self> {
        let log_data = log.data();
        let decoded = Transfer::decode_raw_log(log.topics(), &log_data.data)?;

        Ok(Self {
            from: decoded.from,
            to: decoded.to,
            value: decoded.value,
            timestamp,
            block_number: log
                .block_number
                .ok_or(LedgerError::MissingField { field: "blockNumber" })?,
            log_index: log
                .log_index
                .ok_or(LedgerError::MissingField { field: "logIndex" })?,
            transaction_hash: log
                .transaction_hash
                .ok_or(LedgerError::MissingField { field: "transactionHash" })?,
        })
    }
}

/// Transfer row as returned by the Etherscan `tokentx` endpoint. Every field
/// is a string there, and any of them may be absent on a malformed row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransfer {
    pub block_number: Option<String>,
    pub time_stamp: Option<String>,
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub log_index: Option<String>,
    pub token_decimal: Option<String>,
}

impl RawTransfer {
    /// Parse into a typed event. `fallback_log_index` is used when the row
    /// carries no `logIndex`.
    pub fn parse(&self, fallback_log_index: u64) -> Result<TransferEvent, LedgerError> {
        let from = parse_address("from", self.from.as_deref())?;
        let to = parse_address("to", self.to.as_deref())?;
        let value = parse_value(self.value.as_deref())?;

        let raw_timestamp = self
            .time_stamp
            .as_deref()
            .ok_or(LedgerError::MissingField { field: "timeStamp" })?;
        let timestamp = parse_timestamp(raw_timestamp)?;

        let raw_block = self
            .block_number
            .as_deref()
            .ok_or(LedgerError::MissingField { field: "blockNumber" })?;
        let block_number = raw_block
            .trim()
            .parse::<u64>()
            .map_err(|_| LedgerError::InvalidValue {
                value: raw_block.to_string(),
            })?;

        let log_index = match self.log_index.as_deref() {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| LedgerError::InvalidValue {
                    value: raw.to_string(),
                })?,
            None => fallback_log_index,
        };

        let raw_hash = self
            .hash
            .as_deref()
            .ok_or(LedgerError::MissingField { field: "hash" })?;
        let transaction_hash =
            B256::from_str(raw_hash.trim()).map_err(|_| LedgerError::InvalidValue {
                value: raw_hash.to_string(),
            })?;

        Ok(TransferEvent {
            from,
            to,
            value,
            timestamp,
            block_number,
            log_index,
            transaction_hash,
        })
    }
}

fn parse_address(field: &'static str, raw: Option<&str>) -> Result<Address, LedgerError> {
    let raw = raw.ok_or(LedgerError::MissingField { field })?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::MissingField { field });
    }
    Address::from_str(trimmed).map_err(|_| LedgerError::InvalidAddress {
        field,
        value: raw.to_string(),
    })
}

fn parse_value(raw: Option<&str>) -> Result<U256, LedgerError> {
    let raw = raw.ok_or(LedgerError::MissingField { field: "value" })?;
    let trimmed = raw.trim();

    if trimmed.starts_with('-') {
        return Err(LedgerError::NegativeValue {
            value: raw.to_string(),
        });
    }
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LedgerError::InvalidValue {
            value: raw.to_string(),
        });
    }

    U256::from_str_radix(trimmed, 10).map_err(|_| LedgerError::InvalidValue {
        value: raw.to_string(),
    })
}

/// Accepts seconds or milliseconds and always returns seconds.
pub fn parse_timestamp(raw: &str) -> Result<u64, LedgerError> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| LedgerError::InvalidTimestamp {
            value: raw.to_string(),
        })?;

    if value >= MILLISECOND_THRESHOLD {
        Ok(value / 1000)
    } else {
        Ok(value)
    }
}
