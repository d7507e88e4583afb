use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tokens (
                address TEXT PRIMARY KEY,
                deployment_block INTEGER NOT NULL,
                last_processed_block INTEGER,
                decimals INTEGER
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS transfers (
                transaction_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                token_address TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                value TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (transaction_hash, log_index),
                FOREIGN KEY (token_address) REFERENCES tokens(address)
            )",
            [],
        )?;

        // Replay reads the whole log in chain order
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transfers_token_position
             ON transfers(token_address, block_number, log_index)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS treasury_holdings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                eth_balance_wei TEXT NOT NULL,
                eth_price REAL NOT NULL,
                fetched_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}
