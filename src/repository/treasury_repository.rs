use crate::treasury::TreasuryHoldings;
use alloy_primitives::U256;
use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};
use std::str::FromStr;

/// History of fetched treasury holdings; readers only need the newest row.
pub struct TreasuryRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TreasuryRepository<'a> {
    const INSERT: &'static str =
        "INSERT INTO treasury_holdings (eth_balance_wei, eth_price, fetched_at) VALUES (?1, ?2, ?3)";
    const SELECT_LATEST: &'static str = "SELECT eth_balance_wei, eth_price, fetched_at
         FROM treasury_holdings ORDER BY fetched_at DESC, id DESC LIMIT 1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, holdings: &TreasuryHoldings) -> Result<()> {
        self.conn.execute(
            Self::INSERT,
            params![
                holdings.eth_balance_wei.to_string(),
                holdings.eth_price,
                holdings.fetched_at
            ],
        )?;
        Ok(())
    }

    pub fn latest(&self) -> Result<Option<TreasuryHoldings>> {
        let row = self
            .conn
            .query_row(Self::SELECT_LATEST, [], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .optional()?;

        row.map(|(wei, eth_price, fetched_at)| {
            Ok(TreasuryHoldings {
                eth_balance_wei: U256::from_str(&wei)
                    .with_context(|| format!("Invalid stored balance '{wei}'"))?,
                eth_price,
                fetched_at,
            })
        })
        .transpose()
    }
}
