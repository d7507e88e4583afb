use crate::events::TransferEvent;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, NaiveDate};
use std::collections::HashMap;

/// First non-mint credit of an address: when it bought in and how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionRecord {
    pub address: Address,
    pub timestamp: u64,
    pub amount: U256,
}

impl AcquisitionRecord {
    /// UTC calendar date of the acquisition.
    pub fn date(&self) -> Option<NaiveDate> {
        let seconds = i64::try_from(self.timestamp).ok()?;
        DateTime::from_timestamp(seconds, 0).map(|dt| dt.date_naive())
    }
}

/// First-write-wins index of acquisition records.
///
/// Mints never create a record: an address that only received freshly
/// created tokens paid nothing for them. Burns never create one for the zero
/// address either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstAcquisitionIndex {
    records: HashMap<Address, AcquisitionRecord>,
}

impl FirstAcquisitionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(events: &[TransferEvent]) -> Self {
        let mut index = Self::new();
        for event in events {
            index.observe(event);
        }
        index
    }

    /// Returns true when the event created a new record.
    pub fn observe(&mut self, event: &TransferEvent) -> bool {
        if event.is_mint() || event.is_burn() || self.records.contains_key(&event.to) {
            return false;
        }

        self.records.insert(
            event.to,
            AcquisitionRecord {
                address: event.to,
                timestamp: event.timestamp,
                amount: event.value,
            },
        );
        true
    }

    pub fn get(&self, address: &Address) -> Option<&AcquisitionRecord> {
        self.records.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.records.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AcquisitionRecord> {
        self.records.values()
    }
}
