use crate::repository::{Database, Token, TokenRepository, TransferRepository};
use crate::source::TransferEventSource;
use alloy_primitives::Address;
use anyhow::Result;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub inserted: usize,
    pub last_processed_block: u64,
}

/// Pull new transfers from `source` into the database, resuming after the
/// last processed block.
pub async fn sync_transfers<S: TransferEventSource>(
    source: &S,
    db: &Database,
    token: Address,
) -> Result<SyncReport> {
    let from_block = TokenRepository::new(&db.conn)
        .get_last_processed_block(&token)?
        .map(|block| block + 1)
        .unwrap_or(0);

    info!(
        "Syncing transfers for {:?} from block {} via {}",
        token,
        from_block,
        source.name()
    );

    let start = Instant::now();
    let batch = source.fetch_transfers(token, from_block).await?;

    let token_repo = TokenRepository::new(&db.conn);
    token_repo.insert(&Token {
        address: token,
        deployment_block: batch.start_block,
        last_processed_block: None,
        decimals: batch.decimals,
    })?;
    if let Some(decimals) = batch.decimals {
        token_repo.update_decimals(&token, decimals)?;
    }

    let inserted = TransferRepository::new(&db.conn).insert_batch(&token, &batch.events)?;
    token_repo.update_last_processed_block(&token, batch.end_block)?;

    info!(
        "Inserted {} of {} fetched transfers in {:?}, last processed block {}",
        inserted,
        batch.events.len(),
        start.elapsed(),
        batch.end_block
    );

    Ok(SyncReport {
        fetched: batch.events.len(),
        inserted,
        last_processed_block: batch.end_block,
    })
}
