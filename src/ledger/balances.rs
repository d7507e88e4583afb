use crate::error::LedgerError;
use crate::events::TransferEvent;
use alloy_primitives::{Address, I256, U256};
use std::collections::HashMap;

/// Signed running balances rebuilt from a transfer log.
///
/// Balances are never clamped. A negative entry means the log is incomplete
/// or inconsistent and is reported through [`BalanceLedger::negative_balances`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceLedger {
    balances: HashMap<Address, I256>,
    total_minted: U256,
    total_burned: U256,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay an already ordered sequence from an empty ledger.
    pub fn replay(events: &[TransferEvent]) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for (index, event) in events.iter().enumerate() {
            ledger.apply(index, event)?;
        }
        Ok(ledger)
    }

    /// Apply one event. `index` is the event's position in the replayed
    /// sequence and only used for error reporting.
    pub fn apply(&mut self, index: usize, event: &TransferEvent) -> Result<(), LedgerError> {
        let amount = I256::try_from(event.value).map_err(|_| LedgerError::Overflow { index })?;

        if !event.is_mint() {
            let balance = self.balances.entry(event.from).or_insert(I256::ZERO);
            *balance = balance
                .checked_sub(amount)
                .ok_or(LedgerError::Overflow { index })?;
        }

        if !event.is_burn() {
            let balance = self.balances.entry(event.to).or_insert(I256::ZERO);
            *balance = balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { index })?;
        }

        // A zero-to-zero transfer neither creates nor destroys supply
        match (event.is_mint(), event.is_burn()) {
            (true, false) => {
                self.total_minted = self
                    .total_minted
                    .checked_add(event.value)
                    .ok_or(LedgerError::Overflow { index })?;
            }
            (false, true) => {
                self.total_burned = self
                    .total_burned
                    .checked_add(event.value)
                    .ok_or(LedgerError::Overflow { index })?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Balance for an address, zero when it never appeared.
    pub fn balance_of(&self, address: &Address) -> I256 {
        self.balances.get(address).copied().unwrap_or(I256::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &I256)> {
        self.balances.iter()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn total_minted(&self) -> U256 {
        self.total_minted
    }

    pub fn total_burned(&self) -> U256 {
        self.total_burned
    }

    /// Sum of every balance, `None` on overflow.
    pub fn total(&self) -> Option<I256> {
        self.balances
            .values()
            .try_fold(I256::ZERO, |acc, balance| acc.checked_add(*balance))
    }

    /// Minted minus burned, `None` if either side does not fit an `I256`.
    pub fn net_supply(&self) -> Option<I256> {
        let minted = I256::try_from(self.total_minted).ok()?;
        let burned = I256::try_from(self.total_burned).ok()?;
        minted.checked_sub(burned)
    }

    /// Addresses that ended below zero, sorted by address.
    pub fn negative_balances(&self) -> Vec<(Address, I256)> {
        let mut negative: Vec<(Address, I256)> = self
            .balances
            .iter()
            .filter(|(_, balance)| balance.is_negative())
            .map(|(address, balance)| (*address, *balance))
            .collect();
        negative.sort_by(|a, b| a.0.cmp(&b.0));
        negative
    }
}
