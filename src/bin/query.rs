use anyhow::Result;
use buyin_indexer::config::Config;
use buyin_indexer::query::commands::{
    HolderOrder, HolderQuery, cmd_distribution, cmd_holder, cmd_holders, cmd_snapshot, cmd_stats,
    cmd_summary, resolve_treasury_value,
};
use buyin_indexer::query::formatters::OutputFormat;
use buyin_indexer::repository::{
    Database, TokenRepository, TransferRepository, TreasuryRepository,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query token holders and buy-in data", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current holders, largest first
    Holders {
        #[arg(long)]
        limit: Option<usize>,

        /// Only holders that acquired tokens by transfer
        #[arg(long, default_value = "false")]
        buy_in_only: bool,

        /// Order by acquisition time instead of balance
        #[arg(long, default_value = "false")]
        by_acquisition: bool,
    },
    /// Balance and buy-in details for one address
    Holder {
        address: String,

        /// Treasury value in USD used to value the position. Defaults to the
        /// holdings last stored by the indexer.
        #[arg(long)]
        treasury_value: Option<f64>,
    },
    /// Buy-in holders grouped by acquisition date
    Distribution,
    Summary,
    Stats,
    /// Write the treasury snapshot as JSON
    Snapshot {
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore the cached snapshot
        #[arg(long, default_value = "false")]
        refresh: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url)?;
    let transfer_repo = TransferRepository::new(&db.conn);
    let token_repo = TokenRepository::new(&db.conn);
    let token_address = &config.token_address;
    let options = &config.replay;

    match cli.command {
        Commands::Holders {
            limit,
            buy_in_only,
            by_acquisition,
        } => {
            let query = HolderQuery {
                limit,
                buy_in_only,
                order: if by_acquisition {
                    HolderOrder::Acquisition
                } else {
                    HolderOrder::Balance
                },
            };
            cmd_holders(&transfer_repo, &token_repo, token_address, options, query, &format)?;
        }
        Commands::Holder {
            address,
            treasury_value,
        } => {
            let treasury_value =
                resolve_treasury_value(&TreasuryRepository::new(&db.conn), treasury_value)?;
            cmd_holder(
                &transfer_repo,
                &token_repo,
                token_address,
                options,
                &address,
                &config.buy_in,
                treasury_value,
                &format,
            )?;
        }
        Commands::Distribution => {
            cmd_distribution(&transfer_repo, &token_repo, token_address, options, &format)?;
        }
        Commands::Summary => {
            cmd_summary(&transfer_repo, token_address, options, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&transfer_repo, token_address, &format)?;
        }
        Commands::Snapshot { output, refresh } => {
            cmd_snapshot(&db, &config, output.as_deref(), refresh)?;
        }
    }

    Ok(())
}
