use super::models::CachedSnapshot;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use std::time::Duration;
use tracing::debug;

/// Key-value cache of rendered snapshots with time-based expiry.
pub struct SnapshotRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SnapshotRepository<'a> {
    const UPSERT: &'static str =
        "INSERT OR REPLACE INTO snapshots (key, payload, created_at) VALUES (?1, ?2, ?3)";
    const SELECT: &'static str = "SELECT payload, created_at FROM snapshots WHERE key = ?1";
    const DELETE: &'static str = "DELETE FROM snapshots WHERE key = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn save(&self, key: &str, payload: &str) -> Result<()> {
        self.save_at(key, payload, Utc::now().timestamp_millis())
    }

    pub fn save_at(&self, key: &str, payload: &str, created_at: i64) -> Result<()> {
        self.conn
            .execute(Self::UPSERT, params![key, payload, created_at])?;
        Ok(())
    }

    pub fn load(&self, key: &str, ttl: Duration) -> Result<Option<CachedSnapshot>> {
        self.load_at(key, ttl, Utc::now().timestamp_millis())
    }

    /// Returns the entry if it is younger than `ttl` at `now` (ms). Expired
    /// entries are deleted.
    pub fn load_at(&self, key: &str, ttl: Duration, now: i64) -> Result<Option<CachedSnapshot>> {
        let cached = self
            .conn
            .query_row(Self::SELECT, params![key], |row| {
                Ok(CachedSnapshot {
                    payload: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })
            .optional()?;

        let Some(cached) = cached else {
            return Ok(None);
        };

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        if now.saturating_sub(cached.created_at) > ttl_ms {
            debug!("Snapshot '{}' expired, removing it", key);
            self.clear(key)?;
            return Ok(None);
        }

        Ok(Some(cached))
    }

    pub fn clear(&self, key: &str) -> Result<()> {
        self.conn.execute(Self::DELETE, params![key])?;
        Ok(())
    }

    pub fn is_stale(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.load(key, ttl)?.is_none())
    }
}
