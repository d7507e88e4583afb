use super::acquisitions::{AcquisitionRecord, FirstAcquisitionIndex};
use super::balances::BalanceLedger;
use crate::error::LedgerError;
use alloy_primitives::{Address, U256};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A current holder. `acquisition` is `None` for pure mint recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub address: Address,
    pub balance: U256,
    pub acquisition: Option<AcquisitionRecord>,
}

impl Holder {
    pub fn acquisition_timestamp(&self) -> Option<u64> {
        self.acquisition.map(|record| record.timestamp)
    }

    pub fn acquisition_amount(&self) -> Option<U256> {
        self.acquisition.map(|record| record.amount)
    }

    pub fn has_buy_in(&self) -> bool {
        self.acquisition.is_some()
    }
}

/// Join balances with acquisition records, keeping strictly positive balances.
/// The result has no particular order.
pub fn project(balances: &BalanceLedger, acquisitions: &FirstAcquisitionIndex) -> Vec<Holder> {
    balances
        .iter()
        .filter(|(_, balance)| balance.is_positive())
        .map(|(address, balance)| Holder {
            address: *address,
            balance: balance.into_raw(),
            acquisition: acquisitions.get(address).copied(),
        })
        .collect()
}

/// Holders that have both a positive balance and a buy-in record.
pub fn buy_in_holders(holders: &[Holder]) -> Vec<Holder> {
    holders.iter().filter(|h| h.has_buy_in()).cloned().collect()
}

/// Balance descending, ties broken by address.
pub fn sort_by_balance(holders: &mut [Holder]) {
    holders.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.address.cmp(&b.address))
    });
}

/// Acquisition time ascending, ties broken by address. Mint-only holders go last.
pub fn sort_by_acquisition(holders: &mut [Holder]) {
    holders.sort_by(|a, b| {
        let by_time = match (a.acquisition_timestamp(), b.acquisition_timestamp()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| a.address.cmp(&b.address))
    });
}

pub fn top_holders(holders: &[Holder], limit: usize) -> Vec<Holder> {
    let mut ranked = holders.to_vec();
    sort_by_balance(&mut ranked);
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionRow {
    pub date: NaiveDate,
    pub holder_count: usize,
    /// Sum of the current balances of holders who bought in on `date`.
    pub total: U256,
}

/// Group buy-in holders by the UTC date of their acquisition, oldest first.
pub fn distribution(holders: &[Holder]) -> Result<Vec<DistributionRow>, LedgerError> {
    let mut groups: BTreeMap<NaiveDate, (usize, U256)> = BTreeMap::new();

    for holder in holders {
        let Some(record) = holder.acquisition else {
            continue;
        };
        let date = record.date().ok_or_else(|| LedgerError::InvalidTimestamp {
            value: record.timestamp.to_string(),
        })?;

        let entry = groups.entry(date).or_insert((0, U256::ZERO));
        entry.0 += 1;
        entry.1 = entry
            .1
            .checked_add(holder.balance)
            .ok_or(LedgerError::DistributionOverflow { date })?;
    }

    Ok(groups
        .into_iter()
        .map(|(date, (holder_count, total))| DistributionRow {
            date,
            holder_count,
            total,
        })
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuyInSummary {
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
    pub buy_in_holders: usize,
    pub mint_only_holders: usize,
}

pub fn summarize(holders: &[Holder], rows: &[DistributionRow]) -> BuyInSummary {
    let buy_in = holders.iter().filter(|h| h.has_buy_in()).count();
    BuyInSummary {
        earliest: rows.first().map(|row| row.date),
        latest: rows.last().map(|row| row.date),
        buy_in_holders: buy_in,
        mint_only_holders: holders.len() - buy_in,
    }
}
