use super::models::Token;
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct TokenRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TokenRepository<'a> {
    const INSERT_TOKEN: &'static str =
        "INSERT OR IGNORE INTO tokens (address, deployment_block, last_processed_block, decimals)
         VALUES (?1, ?2, ?3, ?4)";

    const UPDATE_LAST_PROCESSED_BLOCK: &'static str =
        "UPDATE tokens SET last_processed_block = ?1 WHERE address = ?2";

    const UPDATE_DECIMALS: &'static str = "UPDATE tokens SET decimals = ?1 WHERE address = ?2";

    const GET_LAST_PROCESSED_BLOCK: &'static str =
        "SELECT last_processed_block FROM tokens WHERE address = ?1";

    const GET_DECIMALS: &'static str = "SELECT decimals FROM tokens WHERE address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, token: &Token) -> Result<()> {
        self.conn.execute(
            Self::INSERT_TOKEN,
            params![
                format!("{:?}", token.address),
                token.deployment_block,
                token.last_processed_block.unwrap_or(token.deployment_block),
                token.decimals,
            ],
        )?;
        Ok(())
    }

    pub fn get_last_processed_block(&self, address: &Address) -> Result<Option<u64>> {
        let block: Option<Option<u64>> = self
            .conn
            .query_row(
                Self::GET_LAST_PROCESSED_BLOCK,
                params![format!("{:?}", address)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(block.flatten())
    }

    pub fn update_last_processed_block(&self, address: &Address, block_number: u64) -> Result<()> {
        self.conn.execute(
            Self::UPDATE_LAST_PROCESSED_BLOCK,
            params![block_number, format!("{:?}", address)],
        )?;
        Ok(())
    }

    pub fn get_token_decimals(&self, address: &Address) -> Result<Option<u8>> {
        let decimals: Option<Option<u8>> = self
            .conn
            .query_row(
                Self::GET_DECIMALS,
                params![format!("{:?}", address)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(decimals.flatten())
    }

    pub fn update_decimals(&self, address: &Address, decimals: u8) -> Result<()> {
        self.conn.execute(
            Self::UPDATE_DECIMALS,
            params![decimals, format!("{:?}", address)],
        )?;
        Ok(())
    }
}
