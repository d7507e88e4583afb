use crate::ledger::{DistributionRow, Ledger, distribution, sort_by_balance};
use crate::treasury::TreasuryHoldings;
use crate::valuation::{BuyInTerms, change_percent, share_percent, share_value, to_token_units};
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHolder {
    pub address: String,
    pub balance: String,
    pub balance_raw: String,
    pub share_percent: f64,
    pub acquisition_timestamp: Option<u64>,
    pub acquisition_amount: Option<String>,
    pub buy_in_eth: Option<f64>,
    pub buy_in_usd: Option<f64>,
    /// Holder's share of the treasury value in USD.
    pub share_value: Option<f64>,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDistributionRow {
    pub date: String,
    pub holder_count: usize,
    pub total: String,
}

/// Serialized view of the holder set, as consumed by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasurySnapshot {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub token: String,
    pub decimals: u8,
    pub total_supply: String,
    pub holder_count: usize,
    pub holders: Vec<SnapshotHolder>,
    pub distribution: Vec<SnapshotDistributionRow>,
    pub negative_balances: usize,
    /// Summed over the treasury wallets. Absent until holdings were fetched.
    pub eth_balance: Option<f64>,
    pub eth_price: Option<f64>,
    pub treasury_value: Option<f64>,
}

impl TreasurySnapshot {
    pub fn build(
        ledger: &Ledger,
        token: Address,
        decimals: u8,
        buy_in: &BuyInTerms,
        treasury: Option<&TreasuryHoldings>,
    ) -> Result<Self> {
        let mut holders = ledger.holders();
        sort_by_balance(&mut holders);

        let supply = circulating_supply(ledger, holders.iter().map(|h| h.balance));
        let supply_units = to_token_units(supply, decimals);

        let rows = distribution(&holders)?;
        let treasury_value = treasury.map(TreasuryHoldings::value_usd);

        let snapshot_holders = holders
            .iter()
            .map(|holder| {
                let tokens = to_token_units(holder.balance, decimals);
                let bought = holder.acquisition_amount().map(|a| to_token_units(a, decimals));
                let buy_in_usd = bought.map(|t| buy_in.usd_paid(t));
                let value = treasury_value.map(|v| share_value(tokens, supply_units, v));
                SnapshotHolder {
                    address: format!("{:?}", holder.address),
                    balance: display_units(holder.balance, decimals),
                    balance_raw: holder.balance.to_string(),
                    share_percent: share_percent(tokens, supply_units),
                    acquisition_timestamp: holder.acquisition_timestamp(),
                    acquisition_amount: holder.acquisition_amount().map(|a| a.to_string()),
                    buy_in_eth: bought.map(|t| buy_in.eth_paid(t)),
                    buy_in_usd,
                    share_value: value,
                    change_percent: value
                        .zip(buy_in_usd)
                        .map(|(current, paid)| change_percent(current, paid)),
                }
            })
            .collect::<Vec<_>>();

        Ok(TreasurySnapshot {
            timestamp: Utc::now().timestamp_millis(),
            token: format!("{token:?}"),
            decimals,
            total_supply: display_units(supply, decimals),
            holder_count: snapshot_holders.len(),
            holders: snapshot_holders,
            distribution: rows.iter().map(|row| distribution_row(row, decimals)).collect(),
            negative_balances: ledger.negative_balances().len(),
            eth_balance: treasury.map(TreasuryHoldings::eth_balance),
            eth_price: treasury.map(|t| t.eth_price),
            treasury_value,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).context("Failed to parse cached snapshot")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Snapshot saved to {}", path.display());
        Ok(())
    }
}

/// Minted minus burned when the log is consistent, otherwise the sum of
/// positive balances.
pub fn circulating_supply(ledger: &Ledger, balances: impl Iterator<Item = U256>) -> U256 {
    match ledger.balances.net_supply() {
        Some(net) if !net.is_negative() && ledger.negative_balances().is_empty() => net.into_raw(),
        _ => balances.fold(U256::ZERO, |acc, b| acc.saturating_add(b)),
    }
}

fn distribution_row(row: &DistributionRow, decimals: u8) -> SnapshotDistributionRow {
    SnapshotDistributionRow {
        date: row.date.format("%Y-%m-%d").to_string(),
        holder_count: row.holder_count,
        total: display_units(row.total, decimals),
    }
}

fn display_units(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TransferEvent;
    use crate::ledger::{ReplayOptions, replay};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn ledger() -> Ledger {
        let events = vec![
            TransferEvent::new(Address::ZERO, addr(0xa), U256::from(4_000_000u64), 1_623_400_000),
            TransferEvent::new(addr(0xa), addr(0xb), U256::from(1_000_000u64), 1_623_484_800),
        ];
        replay(&events, &ReplayOptions::default()).unwrap()
    }

    #[test]
    fn test_build_snapshot() {
        let terms = BuyInTerms {
            rate: 1_000_000.0,
            eth_price: 2600.0,
        };
        let snapshot = TreasurySnapshot::build(&ledger(), addr(0x99), 0, &terms, None).unwrap();

        assert_eq!(snapshot.holder_count, 2);
        assert_eq!(snapshot.total_supply, display_units(U256::from(4_000_000u64), 0));
        assert_eq!(snapshot.holders[0].address, format!("{:?}", addr(0xa)));
        assert_eq!(snapshot.holders[0].share_percent, 75.0);
        assert_eq!(snapshot.holders[0].acquisition_timestamp, None);
        assert_eq!(snapshot.holders[1].buy_in_eth, Some(1.0));
        assert_eq!(snapshot.holders[1].buy_in_usd, Some(2600.0));
        assert_eq!(snapshot.distribution.len(), 1);
        assert_eq!(snapshot.distribution[0].date, "2021-06-12");
        assert_eq!(snapshot.negative_balances, 0);
        assert_eq!(snapshot.treasury_value, None);
        assert_eq!(snapshot.holders[1].share_value, None);
    }

    #[test]
    fn test_treasury_value_feeds_holder_share() {
        let terms = BuyInTerms {
            rate: 1_000_000.0,
            eth_price: 2600.0,
        };
        // 2 ETH at $2000
        let holdings = TreasuryHoldings {
            eth_balance_wei: U256::from(2_000_000_000_000_000_000u128),
            eth_price: 2000.0,
            fetched_at: 0,
        };
        let snapshot =
            TreasurySnapshot::build(&ledger(), addr(0x99), 0, &terms, Some(&holdings)).unwrap();

        assert_eq!(snapshot.eth_balance, Some(2.0));
        assert_eq!(snapshot.eth_price, Some(2000.0));
        assert_eq!(snapshot.treasury_value, Some(4000.0));
        // 75% and 25% of supply
        assert_eq!(snapshot.holders[0].share_value, Some(3000.0));
        assert_eq!(snapshot.holders[0].change_percent, None);
        assert_eq!(snapshot.holders[1].share_value, Some(1000.0));
        assert_eq!(snapshot.holders[1].buy_in_usd, Some(2600.0));
        let change = snapshot.holders[1].change_percent.unwrap();
        assert!((change - (1000.0 - 2600.0) / 2600.0 * 100.0).abs() < 1e-9);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"treasuryValue\""));
        assert!(json.contains("\"shareValue\""));
    }

    #[test]
    fn test_json_roundtrip_uses_camel_case() {
        let terms = BuyInTerms {
            rate: 1_000_000.0,
            eth_price: 2600.0,
        };
        let snapshot = TreasurySnapshot::build(&ledger(), addr(0x99), 18, &terms, None).unwrap();
        let json = snapshot.to_json().unwrap();

        assert!(json.contains("\"totalSupply\""));
        assert!(json.contains("\"acquisitionTimestamp\""));
        assert_eq!(TreasurySnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_supply_falls_back_when_log_is_partial() {
        let events = vec![TransferEvent::new(addr(1), addr(2), U256::from(30u64), 1)];
        let ledger = replay(&events, &ReplayOptions::default()).unwrap();
        let balances = ledger.holders().into_iter().map(|h| h.balance);
        assert_eq!(circulating_supply(&ledger, balances), U256::from(30u64));
    }
}
