use crate::config::Config;
use crate::deployment::find_deployment_block;
use crate::events::{Transfer, TransferEvent};
use crate::rpc::RpcClient;
use crate::source::{TransferBatch, TransferEventSource};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

const BATCH_SIZE: u64 = 1000; // Most public RPCs allow up to 1k logs per request
const TIMESTAMP_CONCURRENCY: usize = 8;

/// Transfer source that scans `eth_getLogs` in fixed block windows.
pub struct Scanner {
    client: RpcClient,
    transfer_topic: B256,
    rate_limit_delay: Duration,
    skip_malformed: bool,
}

impl Scanner {
    pub fn new(client: RpcClient) -> Self {
        Scanner {
            client,
            transfer_topic: Transfer::SIGNATURE_HASH,
            rate_limit_delay: Duration::from_millis(200),
            skip_malformed: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = RpcClient::new(&config.json_rpc_urls)?;
        let mut scanner = Self::new(client);
        scanner.rate_limit_delay = config.rate_limit_delay;
        scanner.skip_malformed = config.skip_malformed;
        Ok(scanner)
    }

    /// Fill `cache` with timestamps for blocks the logs reference but do not
    /// carry a timestamp for.
    async fn resolve_timestamps(&self, logs: &[Log], cache: &mut HashMap<u64, u64>) -> Result<()> {
        let missing: BTreeSet<u64> = logs
            .iter()
            .filter(|log| log.block_timestamp.is_none())
            .filter_map(|log| log.block_number)
            .filter(|block| !cache.contains_key(block))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        debug!("Fetching timestamps for {} blocks", missing.len());

        let fetched: Vec<(u64, u64)> = stream::iter(missing)
            .map(|block| {
                let client = self.client.clone();
                async move {
                    let timestamp = client.get_block_timestamp(block).await?;
                    Ok::<_, anyhow::Error>((block, timestamp))
                }
            })
            .buffer_unordered(TIMESTAMP_CONCURRENCY)
            .try_collect()
            .await?;

        cache.extend(fetched);
        Ok(())
    }

    fn decode_logs(&self, logs: &[Log], timestamps: &HashMap<u64, u64>) -> Result<Vec<TransferEvent>> {
        let mut events = Vec::with_capacity(logs.len());

        for log in logs {
            let timestamp = log
                .block_timestamp
                .or_else(|| log.block_number.and_then(|b| timestamps.get(&b).copied()))
                .context("Missing block timestamp for transfer log")?;

            match TransferEvent::from_log(log, timestamp) {
                Ok(event) => events.push(event),
                Err(e) if self.skip_malformed => {
                    warn!("Failed to decode transfer event: {}", e);
                }
                Err(e) => return Err(e.context("Failed to decode transfer event")),
            }
        }

        events.sort_by_key(|e| e.position());
        Ok(events)
    }
}

impl TransferEventSource for Scanner {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn fetch_transfers(&self, token: Address, from_block: u64) -> Result<TransferBatch> {
        let latest_block = self.client.get_latest_block().await?;

        let start_block = if from_block == 0 {
            find_deployment_block(&self.client, token, latest_block).await?
        } else {
            from_block
        };

        let decimals = match self.client.get_token_decimals(token).await {
            Ok(decimals) => Some(decimals),
            Err(e) => {
                warn!("Failed to fetch token decimals: {}", e);
                None
            }
        };

        let mut batch = TransferBatch {
            start_block,
            end_block: start_block.saturating_sub(1),
            decimals,
            ..Default::default()
        };
        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut from = start_block;

        info!("Scanning blocks {} to {}", start_block, latest_block);

        while from <= latest_block {
            let loop_start = Instant::now();
            let to_block = (from + BATCH_SIZE - 1).min(latest_block);

            let logs = self
                .client
                .get_logs(from, to_block, token, self.transfer_topic)
                .await?;
            debug!("Received {} logs for blocks {} to {}", logs.len(), from, to_block);

            self.resolve_timestamps(&logs, &mut timestamps).await?;
            batch.events.extend(self.decode_logs(&logs, &timestamps)?);
            batch.end_block = to_block;
            from = to_block + 1;

            // Keep a minimum spacing between windows
            let elapsed = loop_start.elapsed();
            if elapsed < self.rate_limit_delay {
                sleep(self.rate_limit_delay - elapsed).await;
            }
        }

        info!(
            "Collected {} transfers up to block {}",
            batch.events.len(),
            batch.end_block
        );
        Ok(batch)
    }
}
