use anyhow::Result;
use buyin_indexer::config::{Config, SourceKind};
use buyin_indexer::etherscan::EtherscanClient;
use buyin_indexer::query::commands::snapshot_key;
use buyin_indexer::repository::{Database, SnapshotRepository, TreasuryRepository};
use buyin_indexer::scanner::Scanner;
use buyin_indexer::sync::{SyncReport, sync_transfers};
use buyin_indexer::treasury::TreasuryFetcher;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting transfer indexer");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Token address: {:?}", config.token_address);
    info!("Transfer source: {:?}", config.source);

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let result = match config.source {
        SourceKind::Etherscan => {
            let client = EtherscanClient::from_config(&config)?;
            sync_transfers(&client, &db, config.token_address).await
        }
        SourceKind::Rpc => {
            info!(
                "RPC URLs: {} endpoint(s) configured",
                config.json_rpc_urls.len()
            );
            let scanner = Scanner::from_config(&config)?;
            sync_transfers(&scanner, &db, config.token_address).await
        }
    };

    match result {
        Ok(SyncReport {
            fetched,
            inserted,
            last_processed_block,
        }) => {
            info!(
                "Sync complete: {} fetched, {} new, up to block {}",
                fetched, inserted, last_processed_block
            );

            if config.etherscan_api_key.is_some() {
                if let Err(e) = refresh_treasury(&config, &db).await {
                    warn!("Treasury holdings not updated: {:#}", e);
                }
            } else {
                info!("No ETHERSCAN_API_KEY, skipping treasury holdings");
            }
            Ok(())
        }
        Err(e) => {
            error!("Sync error: {:#}", e);
            Err(e)
        }
    }
}

/// Store fresh treasury holdings and drop the cached snapshot that used the old ones.
async fn refresh_treasury(config: &Config, db: &Database) -> Result<()> {
    let fetcher = TreasuryFetcher::from_config(config)?;
    let holdings = fetcher.fetch_holdings().await?;

    TreasuryRepository::new(&db.conn).insert(&holdings)?;
    SnapshotRepository::new(&db.conn).clear(&snapshot_key(&config.token_address))?;
    Ok(())
}
