use crate::config::Config;
use crate::etherscan::EtherscanClient;
use crate::valuation::to_token_units;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ETH held across the treasury wallets and the ETH/USD price it was valued at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreasuryHoldings {
    pub eth_balance_wei: U256,
    pub eth_price: f64,
    /// Milliseconds since the Unix epoch.
    pub fetched_at: i64,
}

impl TreasuryHoldings {
    pub fn eth_balance(&self) -> f64 {
        to_token_units(self.eth_balance_wei, 18)
    }

    pub fn value_usd(&self) -> f64 {
        self.eth_balance() * self.eth_price
    }
}

pub fn sum_balances(balances: &[U256]) -> Result<U256> {
    balances.iter().try_fold(U256::ZERO, |acc, b| {
        acc.checked_add(*b)
            .context("Treasury balance overflows 256 bits")
    })
}

/// Reads `{"ethereum":{"usd":<price>}}`.
pub fn parse_eth_price(body: &serde_json::Value) -> Result<f64> {
    let price = body
        .get("ethereum")
        .and_then(|e| e.get("usd"))
        .and_then(serde_json::Value::as_f64)
        .with_context(|| format!("Unexpected price response: {body}"))?;

    if !price.is_finite() || price <= 0.0 {
        anyhow::bail!("ETH price must be positive, got {}", price);
    }
    Ok(price)
}

pub struct TreasuryFetcher {
    etherscan: EtherscanClient,
    http: reqwest::Client,
    price_url: String,
    wallets: Vec<Address>,
    request_delay: Duration,
    max_retries: usize,
}

impl TreasuryFetcher {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.treasury_wallets.is_empty() {
            anyhow::bail!("TREASURY_WALLETS must name at least one wallet");
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(TreasuryFetcher {
            etherscan: EtherscanClient::from_config(config)?,
            http,
            price_url: config.eth_price_url.clone(),
            wallets: config.treasury_wallets.clone(),
            request_delay: config.rate_limit_delay,
            max_retries: 5,
        })
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    pub async fn fetch_eth_price(&self) -> Result<f64> {
        let http = self.http.clone();
        let url = self.price_url.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let http = http.clone();
            let url = url.clone();
            async move {
                let body: serde_json::Value = http
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .inspect_err(|e| warn!("ETH price request failed: {}", e))?
                    .json()
                    .await?;
                parse_eth_price(&body)
            }
        })
        .await
    }

    /// Balances are fetched one wallet at a time, `request_delay` apart.
    pub async fn fetch_holdings(&self) -> Result<TreasuryHoldings> {
        let mut balances = Vec::with_capacity(self.wallets.len());
        for (i, wallet) in self.wallets.iter().enumerate() {
            if i > 0 {
                sleep(self.request_delay).await;
            }
            let balance = self.etherscan.fetch_eth_balance(*wallet).await?;
            debug!("Treasury wallet {:?} holds {} wei", wallet, balance);
            balances.push(balance);
        }

        let eth_price = self.fetch_eth_price().await?;
        let holdings = TreasuryHoldings {
            eth_balance_wei: sum_balances(&balances)?,
            eth_price,
            fetched_at: Utc::now().timestamp_millis(),
        };

        info!(
            "Treasury holds {:.4} ETH across {} wallets (${:.2} at ${:.2}/ETH)",
            holdings.eth_balance(),
            self.wallets.len(),
            holdings.value_usd(),
            eth_price
        );
        Ok(holdings)
    }
}
