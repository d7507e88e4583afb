use crate::config::Config;
use crate::events::{RawTransfer, TransferEvent};
use crate::source::{TransferBatch, TransferEventSource};
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

const PAGE_SIZE: usize = 10_000; // Etherscan caps page * offset at 10k rows
const END_BLOCK: u64 = 99_999_999;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chain_id: u64,
    rate_limit_delay: Duration,
    skip_malformed: bool,
    max_retries: usize,
}

impl EtherscanClient {
    pub fn new(base_url: &str, api_key: &str, chain_id: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(EtherscanClient {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            chain_id,
            rate_limit_delay: Duration::from_millis(200),
            skip_malformed: false,
            max_retries: 5,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .etherscan_api_key
            .as_deref()
            .context("ETHERSCAN_API_KEY must be set in .env")?;

        Ok(Self::new(&config.etherscan_api_url, api_key, config.chain_id)?
            .with_rate_limit_delay(config.rate_limit_delay)
            .with_skip_malformed(config.skip_malformed))
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn with_skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    async fn fetch_page(&self, token: Address, start_block: u64) -> Result<Vec<RawTransfer>> {
        self.request(
            vec![
                ("module", "account".to_string()),
                ("action", "tokentx".to_string()),
                ("contractaddress", format!("{token:?}")),
                ("startblock", start_block.to_string()),
                ("endblock", END_BLOCK.to_string()),
                ("page", "1".to_string()),
                ("offset", PAGE_SIZE.to_string()),
                ("sort", "asc".to_string()),
            ],
            parse_response,
        )
        .await
    }

    /// Current ETH balance of `address`, in wei.
    pub async fn fetch_eth_balance(&self, address: Address) -> Result<U256> {
        self.request(
            vec![
                ("module", "account".to_string()),
                ("action", "balance".to_string()),
                ("address", format!("{address:?}")),
                ("tag", "latest".to_string()),
            ],
            parse_balance,
        )
        .await
        .with_context(|| format!("Failed to fetch ETH balance of {address:?}"))
    }

    /// GET with retries. `parse` runs inside the retry loop, so an Etherscan
    /// error body (rate limit included) is retried like a transport failure.
    async fn request<T: Send>(
        &self,
        params: Vec<(&'static str, String)>,
        parse: fn(EtherscanResponse) -> Result<T>,
    ) -> Result<T> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let mut query = vec![("chainid", client.chain_id.to_string())];
            query.extend(params.iter().cloned());
            query.push(("apikey", client.api_key.clone()));
            async move {
                let response = client
                    .http
                    .get(&client.base_url)
                    .query(&query)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());

                let body: EtherscanResponse = match response {
                    Ok(response) => response.json().await.map_err(|e| {
                        warn!("Failed to decode Etherscan response: {}", e);
                        anyhow::anyhow!("{}", e)
                    })?,
                    Err(e) => {
                        warn!("Etherscan request failed: {}", e);
                        return Err(anyhow::anyhow!("{}", e));
                    }
                };

                parse(body).inspect_err(|e| warn!("Etherscan error: {}", e))
            }
        })
        .await
    }
}

fn parse_response(body: EtherscanResponse) -> Result<Vec<RawTransfer>> {
    if body.status == "1" {
        return serde_json::from_value(body.result).context("Unexpected Etherscan result shape");
    }
    if body.message.contains("No transactions found") {
        return Ok(Vec::new());
    }
    let detail = match body.result {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    Err(anyhow::anyhow!("{} ({})", body.message, detail))
}

fn parse_balance(body: EtherscanResponse) -> Result<U256> {
    match (body.status.as_str(), &body.result) {
        ("1", serde_json::Value::String(wei)) => {
            U256::from_str(wei.trim()).with_context(|| format!("Invalid balance '{wei}'"))
        }
        _ => Err(anyhow::anyhow!("{} ({})", body.message, body.result)),
    }
}

/// Parse a page of rows. Rows without a `logIndex` are numbered by their
/// position within their block, which keeps the page's `sort=asc` order once
/// the log is reloaded by `(block_number, log_index)`. Pages never split a
/// block, so the numbering is the same on every fetch.
pub fn parse_rows(rows: &[RawTransfer], skip_malformed: bool) -> Result<Vec<TransferEvent>> {
    let mut per_block: HashMap<Option<String>, u64> = HashMap::new();
    let mut events = Vec::with_capacity(rows.len());

    for row in rows {
        let counter = per_block.entry(row.block_number.clone()).or_insert(0);
        let fallback = *counter;
        *counter += 1;

        match row.parse(fallback) {
            Ok(event) => events.push(event),
            Err(e) if skip_malformed => {
                warn!(
                    "Skipping malformed transfer in tx {}: {}",
                    row.hash.as_deref().unwrap_or("<unknown>"),
                    e
                );
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Malformed transfer in tx {}",
                        row.hash.as_deref().unwrap_or("<unknown>")
                    )
                });
            }
        }
    }

    Ok(events)
}

/// For a full page, drop the rows of its last block (they may continue on
/// the next page) and return the block to resume from.
fn trim_partial_block(events: &mut Vec<TransferEvent>) -> Result<u64> {
    let last_block = events
        .last()
        .map(|e| e.block_number)
        .context("Full Etherscan page without any parsable transfer")?;

    events.retain(|e| e.block_number < last_block);
    if events.is_empty() {
        anyhow::bail!(
            "Block {} alone holds {} or more transfers, cannot paginate",
            last_block,
            PAGE_SIZE
        );
    }
    Ok(last_block)
}

fn token_decimals(rows: &[RawTransfer]) -> Option<u8> {
    rows.iter()
        .find_map(|row| row.token_decimal.as_deref())
        .and_then(|d| d.trim().parse().ok())
}

impl TransferEventSource for EtherscanClient {
    fn name(&self) -> &'static str {
        "etherscan"
    }

    async fn fetch_transfers(&self, token: Address, from_block: u64) -> Result<TransferBatch> {
        let mut batch = TransferBatch {
            start_block: from_block,
            end_block: from_block.saturating_sub(1),
            ..Default::default()
        };
        let mut start_block = from_block;

        loop {
            debug!("Fetching Etherscan page from block {}", start_block);
            let rows = self.fetch_page(token, start_block).await?;
            let full_page = rows.len() >= PAGE_SIZE;

            if batch.decimals.is_none() {
                batch.decimals = token_decimals(&rows);
            }

            let mut events = parse_rows(&rows, self.skip_malformed)?;
            let resume_at = if full_page {
                Some(trim_partial_block(&mut events)?)
            } else {
                None
            };

            info!(
                "Received {} transfers starting at block {}",
                events.len(),
                start_block
            );

            if let Some(last) = events.last() {
                batch.end_block = batch.end_block.max(last.block_number);
            }
            batch.events.extend(events);

            match resume_at {
                Some(block) => {
                    start_block = block;
                    sleep(self.rate_limit_delay).await;
                }
                None => break,
            }
        }

        Ok(batch)
    }
}
