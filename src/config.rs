use crate::ledger::{LedgerMode, ReplayOptions};
use crate::valuation::BuyInTerms;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TOKEN_ADDRESS: &str = "0x992f9Bb313368Ac11977b62490a83eeee54D9e1F";
const DEFAULT_ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";
const DEFAULT_ETH_PRICE_API_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd";
// Main and hot treasury safes
const DEFAULT_TREASURY_WALLETS: &str =
    "0x2f61cD8f256eF199cE0cd3094Bdce77F1B7e91f5,0x3d321A75Ca6666A23ca3D68C94f317C0190868DA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Etherscan,
    Rpc,
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "etherscan" => Ok(SourceKind::Etherscan),
            "rpc" => Ok(SourceKind::Rpc),
            other => Err(anyhow::anyhow!(
                "Unknown TRANSFER_SOURCE '{}', expected 'etherscan' or 'rpc'",
                other
            )),
        }
    }
}

/// Runtime settings. Source credentials are optional here and only checked
/// by the client that needs them, so the query side runs without them.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub etherscan_api_key: Option<String>,
    pub etherscan_api_url: String,
    pub chain_id: u64,
    pub json_rpc_urls: Vec<String>,
    pub token_address: Address,
    pub database_url: String,
    pub replay: ReplayOptions,
    pub skip_malformed: bool,
    pub rate_limit_delay: Duration,
    pub buy_in: BuyInTerms,
    pub snapshot_ttl: Duration,
    pub treasury_wallets: Vec<Address>,
    pub eth_price_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = lookup("TRANSFER_SOURCE")
            .map(|s| SourceKind::from_str(&s))
            .transpose()?
            .unwrap_or(SourceKind::Etherscan);

        let etherscan_api_key = lookup("ETHERSCAN_API_KEY").filter(|k| !k.trim().is_empty());

        let json_rpc_urls: Vec<String> = lookup("JSON_RPC_URLS")
            .map(|urls| {
                urls.split(',')
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let treasury_wallets = match lookup("TREASURY_WALLETS") {
            Some(raw) => parse_addresses(&raw).context("Invalid TREASURY_WALLETS")?,
            None => parse_addresses(DEFAULT_TREASURY_WALLETS)?,
        };

        let token_address_str =
            lookup("TOKEN_ADDRESS").unwrap_or_else(|| DEFAULT_TOKEN_ADDRESS.to_string());
        let token_address =
            Address::from_str(&token_address_str).context("Invalid TOKEN_ADDRESS format")?;

        let mode = lookup("LEDGER_MODE")
            .map(|m| LedgerMode::from_str(&m))
            .transpose()?
            .unwrap_or_default();
        let check_order = lookup("CHECK_ORDER")
            .map(|v| parse_bool(&v))
            .transpose()
            .context("Invalid CHECK_ORDER value")?
            .unwrap_or(false);
        let skip_malformed = lookup("SKIP_MALFORMED")
            .map(|v| parse_bool(&v))
            .transpose()
            .context("Invalid SKIP_MALFORMED value")?
            .unwrap_or(false);

        Ok(Config {
            source,
            etherscan_api_key,
            etherscan_api_url: lookup("ETHERSCAN_API_URL")
                .unwrap_or_else(|| DEFAULT_ETHERSCAN_API_URL.to_string()),
            chain_id: parse_or(&lookup, "CHAIN_ID", 1)?,
            json_rpc_urls,
            token_address,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./buyin.db".to_string()),
            replay: ReplayOptions { mode, check_order },
            skip_malformed,
            rate_limit_delay: Duration::from_millis(parse_or(&lookup, "RATE_LIMIT_DELAY_MS", 200)?),
            buy_in: BuyInTerms {
                rate: parse_or(&lookup, "BUY_IN_RATE", 1_000_000.0)?,
                eth_price: parse_or(&lookup, "BUY_IN_ETH_PRICE", 2600.0)?,
            },
            snapshot_ttl: Duration::from_secs(parse_or(&lookup, "SNAPSHOT_TTL_SECS", 86_400)?),
            treasury_wallets,
            eth_price_url: lookup("ETH_PRICE_API_URL")
                .unwrap_or_else(|| DEFAULT_ETH_PRICE_API_URL.to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        None => Ok(default),
    }
}

fn parse_addresses(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| Address::from_str(a).with_context(|| format!("Invalid address '{a}'")))
        .collect()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(anyhow::anyhow!("expected a boolean, got '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("ETHERSCAN_API_KEY", "key")]).unwrap();
        assert_eq!(config.source, SourceKind::Etherscan);
        assert_eq!(config.chain_id, 1);
        assert_eq!(
            config.token_address,
            Address::from_str(DEFAULT_TOKEN_ADDRESS).unwrap()
        );
        assert_eq!(config.replay, ReplayOptions::default());
        assert!(!config.skip_malformed);
        assert_eq!(config.rate_limit_delay, Duration::from_millis(200));
        assert_eq!(config.buy_in.rate, 1_000_000.0);
        assert_eq!(config.snapshot_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_loads_without_source_credentials() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.source, SourceKind::Etherscan);
        assert!(config.etherscan_api_key.is_none());

        let config = config_from(&[("TRANSFER_SOURCE", "rpc")]).unwrap();
        assert!(config.json_rpc_urls.is_empty());

        // Blank keys count as missing
        let config = config_from(&[("ETHERSCAN_API_KEY", "  ")]).unwrap();
        assert!(config.etherscan_api_key.is_none());
    }

    #[test]
    fn test_treasury_wallets() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.treasury_wallets.len(), 2);
        assert!(config.eth_price_url.contains("coingecko"));

        let config = config_from(&[(
            "TREASURY_WALLETS",
            "0x1111111111111111111111111111111111111111, ",
        )])
        .unwrap();
        assert_eq!(config.treasury_wallets, vec![Address::repeat_byte(0x11)]);

        assert!(config_from(&[("TREASURY_WALLETS", "0x12,0x34")]).is_err());
    }

    #[test]
    fn test_rpc_source() {
        let config = config_from(&[
            ("TRANSFER_SOURCE", "rpc"),
            ("JSON_RPC_URLS", "http://a.example, http://b.example"),
            ("LEDGER_MODE", "strict"),
            ("CHECK_ORDER", "true"),
        ])
        .unwrap();
        assert_eq!(config.source, SourceKind::Rpc);
        assert_eq!(config.json_rpc_urls.len(), 2);
        assert_eq!(config.replay.mode, LedgerMode::Strict);
        assert!(config.replay.check_order);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(config_from(&[("ETHERSCAN_API_KEY", "key"), ("CHAIN_ID", "mainnet")]).is_err());
        assert!(config_from(&[("ETHERSCAN_API_KEY", "key"), ("CHECK_ORDER", "maybe")]).is_err());
    }
}
