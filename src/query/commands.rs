use crate::config::Config;
use crate::ledger::{
    AcquisitionRecord, Ledger, ReplayOptions, buy_in_holders, distribution, replay,
    sort_by_acquisition, sort_by_balance, summarize,
};
use crate::query::formatters::{
    OutputFormat, format_distribution, format_holder_detail, format_holders, format_stats,
    format_summary,
};
use crate::repository::{
    Database, SnapshotRepository, TokenRepository, TransferRepository, TreasuryRepository,
};
use crate::snapshot::{TreasurySnapshot, circulating_supply};
use crate::valuation::{BuyInTerms, change_percent, share_percent, share_value, to_token_units};
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Replay every stored transfer of `token_address` into a fresh ledger.
pub fn load_ledger(
    transfer_repo: &TransferRepository,
    token_address: &Address,
    options: &ReplayOptions,
) -> Result<Ledger> {
    let events = transfer_repo.load_ordered(token_address)?;
    if events.is_empty() {
        warn!("No transfers stored for {:?}, run the indexer first", token_address);
    }

    let ledger = replay(&events, options).context("Failed to replay transfer log")?;

    let negative = ledger.negative_balances();
    if !negative.is_empty() {
        warn!(
            "{} addresses ended with a negative balance, the transfer log is likely incomplete",
            negative.len()
        );
        for (address, balance) in &negative {
            debug!("Negative balance {} for {:?}", balance, address);
        }
    }

    Ok(ledger)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HolderOrder {
    #[default]
    Balance,
    Acquisition,
}

#[derive(Debug, Default)]
pub struct HolderQuery {
    pub limit: Option<usize>,
    pub buy_in_only: bool,
    pub order: HolderOrder,
}

pub fn cmd_holders(
    transfer_repo: &TransferRepository,
    token_repo: &TokenRepository,
    token_address: &Address,
    options: &ReplayOptions,
    query: HolderQuery,
    format: &OutputFormat,
) -> Result<()> {
    let ledger = load_ledger(transfer_repo, token_address, options)?;
    let mut holders = ledger.holders();
    let supply = circulating_supply(&ledger, holders.iter().map(|h| h.balance));

    if query.buy_in_only {
        holders = buy_in_holders(&holders);
    }
    match query.order {
        HolderOrder::Balance => sort_by_balance(&mut holders),
        HolderOrder::Acquisition => sort_by_acquisition(&mut holders),
    }
    if let Some(limit) = query.limit {
        holders.truncate(limit);
    }

    let decimals = token_repo.get_token_decimals(token_address)?;
    let output = format_holders(&holders, supply, decimals, format);
    println!("{output}");

    Ok(())
}

/// One holder's position and what it is worth against the buy-in.
#[derive(Debug, Clone, PartialEq)]
pub struct HolderDetail {
    pub address: Address,
    pub balance: U256,
    pub share_percent: f64,
    pub acquisition: Option<AcquisitionRecord>,
    pub buy_in_eth: Option<f64>,
    pub buy_in_usd: Option<f64>,
    /// Share of the treasury in USD, when a treasury value was given.
    pub current_value: Option<f64>,
    pub change_percent: Option<f64>,
}

pub fn holder_detail(
    ledger: &Ledger,
    address: &Address,
    decimals: u8,
    buy_in: &BuyInTerms,
    treasury_value: Option<f64>,
) -> Option<HolderDetail> {
    let holders = ledger.holders();
    let supply = circulating_supply(ledger, holders.iter().map(|h| h.balance));
    let holder = holders.into_iter().find(|h| h.address == *address)?;

    let tokens = to_token_units(holder.balance, decimals);
    let supply_units = to_token_units(supply, decimals);
    let bought = holder
        .acquisition_amount()
        .map(|amount| to_token_units(amount, decimals));
    let buy_in_usd = bought.map(|t| buy_in.usd_paid(t));
    let current_value = treasury_value.map(|value| share_value(tokens, supply_units, value));

    Some(HolderDetail {
        address: holder.address,
        balance: holder.balance,
        share_percent: share_percent(tokens, supply_units),
        acquisition: holder.acquisition,
        buy_in_eth: bought.map(|t| buy_in.eth_paid(t)),
        buy_in_usd,
        current_value,
        change_percent: current_value
            .zip(buy_in_usd)
            .map(|(current, paid)| change_percent(current, paid)),
    })
}

/// An explicit value wins. Otherwise the last holdings the indexer stored, if any.
pub fn resolve_treasury_value(
    treasury_repo: &TreasuryRepository,
    explicit: Option<f64>,
) -> Result<Option<f64>> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    let latest = treasury_repo.latest()?;
    if latest.is_none() {
        debug!("No treasury holdings stored, holder will not be valued");
    }
    Ok(latest.map(|holdings| holdings.value_usd()))
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_holder(
    transfer_repo: &TransferRepository,
    token_repo: &TokenRepository,
    token_address: &Address,
    options: &ReplayOptions,
    address: &str,
    buy_in: &BuyInTerms,
    treasury_value: Option<f64>,
    format: &OutputFormat,
) -> Result<()> {
    let address = Address::from_str(address)
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))?;

    let ledger = load_ledger(transfer_repo, token_address, options)?;
    let decimals = token_repo.get_token_decimals(token_address)?;

    let detail = holder_detail(&ledger, &address, decimals.unwrap_or(18), buy_in, treasury_value)
        .ok_or_else(|| anyhow::anyhow!("{:?} does not currently hold the token", address))?;

    let output = format_holder_detail(&detail, decimals, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_distribution(
    transfer_repo: &TransferRepository,
    token_repo: &TokenRepository,
    token_address: &Address,
    options: &ReplayOptions,
    format: &OutputFormat,
) -> Result<()> {
    let ledger = load_ledger(transfer_repo, token_address, options)?;
    let rows = distribution(&ledger.holders())?;

    let decimals = token_repo.get_token_decimals(token_address)?;
    let output = format_distribution(&rows, decimals, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_summary(
    transfer_repo: &TransferRepository,
    token_address: &Address,
    options: &ReplayOptions,
    format: &OutputFormat,
) -> Result<()> {
    let ledger = load_ledger(transfer_repo, token_address, options)?;
    let holders = ledger.holders();
    let rows = distribution(&holders)?;
    let summary = summarize(&holders, &rows);

    let output = format_summary(&summary, ledger.negative_balances().len(), format);
    println!("{output}");

    Ok(())
}

pub fn cmd_stats(repo: &TransferRepository, token_address: &Address, format: &OutputFormat) -> Result<()> {
    let stats = repo.get_statistics(token_address)?;
    let output = format_stats(&stats, format);
    println!("{output}");

    Ok(())
}

pub fn snapshot_key(token_address: &Address) -> String {
    format!("treasury:{token_address:?}")
}

/// The cached snapshot while it is fresh, otherwise a rebuilt one that
/// replaces the cache entry.
pub fn load_or_build_snapshot(db: &Database, config: &Config, refresh: bool) -> Result<TreasurySnapshot> {
    let key = snapshot_key(&config.token_address);
    let snapshot_repo = SnapshotRepository::new(&db.conn);

    if refresh {
        snapshot_repo.clear(&key)?;
    } else if let Some(cached) = snapshot_repo.load(&key, config.snapshot_ttl)? {
        info!("Using cached snapshot created at {}", cached.created_at);
        return TreasurySnapshot::from_json(&cached.payload);
    }

    let transfer_repo = TransferRepository::new(&db.conn);
    let ledger = load_ledger(&transfer_repo, &config.token_address, &config.replay)?;
    let decimals = TokenRepository::new(&db.conn)
        .get_token_decimals(&config.token_address)?
        .unwrap_or(18);

    let holdings = TreasuryRepository::new(&db.conn).latest()?;
    if holdings.is_none() {
        warn!("No treasury holdings stored yet, snapshot will carry no treasury value");
    }

    let snapshot = TreasurySnapshot::build(
        &ledger,
        config.token_address,
        decimals,
        &config.buy_in,
        holdings.as_ref(),
    )?;
    snapshot_repo.save(&key, &snapshot.to_json()?)?;
    info!("Built snapshot with {} holders", snapshot.holder_count);

    Ok(snapshot)
}

pub fn cmd_snapshot(db: &Database, config: &Config, output: Option<&Path>, refresh: bool) -> Result<()> {
    let snapshot = load_or_build_snapshot(db, config, refresh)?;

    match output {
        Some(path) => snapshot.write_to(path)?,
        None => println!("{}", snapshot.to_json()?),
    }

    Ok(())
}
