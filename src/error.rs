use alloy_primitives::{Address, I256};

/// Errors raised by event parsing and ledger replay.
///
/// Upstream fetch failures never end up here; sources report those as
/// `anyhow::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Transfer event is missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("Transfer value '{value}' is not a valid unsigned integer")]
    InvalidValue { value: String },

    #[error("Transfer value '{value}' is negative")]
    NegativeValue { value: String },

    #[error("Invalid address '{value}' in field '{field}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid timestamp '{value}'")]
    InvalidTimestamp { value: String },

    #[error("Event #{index} is out of order: {current} comes after {previous}")]
    OutOfOrder {
        index: usize,
        previous: String,
        current: String,
    },

    #[error("Balance of {address} went negative ({balance}) at event #{index}")]
    NegativeBalance {
        address: Address,
        balance: I256,
        index: usize,
    },

    #[error("Arithmetic overflow while applying event #{index}")]
    Overflow { index: usize },

    #[error("Arithmetic overflow while totalling holders acquired on {date}")]
    DistributionOverflow { date: chrono::NaiveDate },
}
