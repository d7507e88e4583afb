use crate::events::TransferEvent;
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use rusqlite::{Row, params};
use std::str::FromStr;

pub struct TransferRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransferRepository<'a> {
    const INSERT_TRANSFER: &'static str = "INSERT OR IGNORE INTO transfers (
            transaction_hash, log_index, token_address,
            from_address, to_address, value, block_number, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

    const SELECT_ORDERED: &'static str = "SELECT transaction_hash, log_index, from_address,
            to_address, value, block_number, timestamp
        FROM transfers
        WHERE token_address = ?1
        ORDER BY block_number ASC, log_index ASC";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Insert a batch inside one transaction. Already stored events are
    /// skipped; the return value counts only new rows.
    pub fn insert_batch(&self, token_address: &Address, events: &[TransferEvent]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(Self::INSERT_TRANSFER)?;
            let token = format!("{token_address:?}");

            for event in events {
                count += stmt.execute(params![
                    format!("{:?}", event.transaction_hash),
                    event.log_index,
                    token,
                    format!("{:?}", event.from),
                    format!("{:?}", event.to),
                    event.value.to_string(),
                    event.block_number,
                    event.timestamp,
                ])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    /// Full log of a token in canonical chain order, ready for replay.
    pub fn load_ordered(&self, token_address: &Address) -> Result<Vec<TransferEvent>> {
        let mut stmt = self.conn.prepare(Self::SELECT_ORDERED)?;
        let events = stmt
            .query_map(params![format!("{token_address:?}")], Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn get_statistics(&self, token_address: &Address) -> Result<TransferStats> {
        let token = format!("{token_address:?}");

        let total_transfers: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM transfers WHERE token_address = ?1",
            params![token],
            |row| row.get(0),
        )?;

        let unique_addresses: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT address) FROM (
                SELECT from_address as address FROM transfers WHERE token_address = ?1
                UNION
                SELECT to_address as address FROM transfers WHERE token_address = ?1
            )",
            params![token],
            |row| row.get(0),
        )?;

        let (earliest_block, latest_block): (Option<u64>, Option<u64>) = self.conn.query_row(
            "SELECT MIN(block_number), MAX(block_number) FROM transfers WHERE token_address = ?1",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(TransferStats {
            total_transfers,
            unique_addresses,
            earliest_block,
            latest_block,
        })
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<TransferEvent> {
        let transaction_hash = B256::from_str(&row.get::<_, String>(0)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let from = Address::from_str(&row.get::<_, String>(2)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let to = Address::from_str(&row.get::<_, String>(3)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let value = U256::from_str_radix(&row.get::<_, String>(4)?, 10).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(TransferEvent {
            from,
            to,
            value,
            timestamp: row.get(6)?,
            block_number: row.get(5)?,
            log_index: row.get(1)?,
            transaction_hash,
        })
    }
}

#[derive(Debug)]
pub struct TransferStats {
    pub total_transfers: usize,
    pub unique_addresses: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}
