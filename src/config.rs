use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::hours::HourPolicy;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:6789";
pub const DEFAULT_BITCOIN_FEE_SATS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinFamily {
    Skycoin,
    Bitcoin,
}

impl CoinFamily {
    /// Number of decimal places in one whole coin.
    pub fn decimals(self) -> u32 {
        match self {
            CoinFamily::Skycoin => 6,
            CoinFamily::Bitcoin => 8,
        }
    }

    /// Decimal places a caller may specify when sending.
    pub fn max_precision(self) -> u32 {
        match self {
            CoinFamily::Skycoin => 3,
            CoinFamily::Bitcoin => 8,
        }
    }
}

/// One entry of `coins.config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinMeta {
    #[serde(default)]
    pub name_in_chinese: String,
    pub name_in_english: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "logoURL", default)]
    pub logo_url: String,
    pub web_interface_port: String,
    #[serde(default)]
    pub node_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<CoinFamily>,
    /// Bitcoin network name: bitcoin, testnet, signet or regtest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_sats: Option<u64>,
}

impl CoinMeta {
    pub fn family(&self) -> CoinFamily {
        self.family.unwrap_or(if self.name_in_english == "bitcoin" {
            CoinFamily::Bitcoin
        } else {
            CoinFamily::Skycoin
        })
    }

    pub fn bitcoin_network(&self) -> Result<Network> {
        parse_network(self.network.as_deref().unwrap_or("bitcoin"))
    }

    /// Flat miner fee for bitcoin; Skycoin-family fees are paid in hours.
    pub fn fee(&self) -> u64 {
        match self.family() {
            CoinFamily::Bitcoin => self.fee_sats.unwrap_or(DEFAULT_BITCOIN_FEE_SATS),
            CoinFamily::Skycoin => 0,
        }
    }
}

pub fn parse_network(network_str: &str) -> Result<Network> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        s => Err(GatewayError::malformed(format!("unknown bitcoin network: {s}"))),
    }
}

/// Supported coins keyed by their English name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinRegistry {
    coins: BTreeMap<String, CoinMeta>,
}

impl CoinRegistry {
    pub fn from_metas(metas: Vec<CoinMeta>) -> Self {
        CoinRegistry {
            coins: metas.into_iter().map(|m| (m.name_in_english.clone(), m)).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let metas: Vec<CoinMeta> = serde_json::from_str(json)?;
        Ok(Self::from_metas(metas))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            log::error!("コイン設定ファイルの読み込みに失敗しました: {:?}", path);
            GatewayError::Config(format!("{}: {}", path.display(), e))
        })?;
        let registry = Self::from_json(&json).map_err(|e| {
            log::error!("コイン設定ファイルのパースに失敗しました: {:?}", path);
            GatewayError::Config(format!("{}: {}", path.display(), e))
        })?;
        log::info!("{:?} から {} 種類のコインを読み込みました。", path, registry.coins.len());
        Ok(registry)
    }

    pub fn resolve(&self, coin_type: &str) -> Result<&CoinMeta> {
        self.coins.get(coin_type).ok_or_else(|| GatewayError::UnsupportedCoinType {
            coin_type: coin_type.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoinMeta> {
        self.coins.values()
    }
}

/// Everything the engine and node client need, built once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub hours: HourPolicy,
    pub coins: CoinRegistry,
}

impl GatewayConfig {
    pub fn new(coins: CoinRegistry) -> Self {
        GatewayConfig {
            server_url: DEFAULT_SERVER.to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(60),
            hours: HourPolicy::default(),
            coins,
        }
    }

    pub fn with_server(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Offline build request read from a JSON file.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuildInput {
    pub coin_type: String,
    pub outputs: Vec<OutputRecord>,
    pub addresses: String,
    pub private_keys: String,
    pub destination: String,
    pub amount: String,
}

/// An unspent output as written in a build input file; `coins` is a
/// decimal string in whole coins.
#[derive(Deserialize, Debug, Clone)]
pub struct OutputRecord {
    pub hash: String,
    #[serde(default)]
    pub index: u32,
    pub address: String,
    pub coins: String,
    #[serde(default)]
    pub hours: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const COINS: &str = r#"[
        {
            "nameInChinese": "天空币",
            "nameInEnglish": "skycoin",
            "symbol": "SKY",
            "logoURL": "static/skycoin.logo.png",
            "webInterfacePort": "6420",
            "nodeVersion": "0.24.1"
        },
        {
            "nameInEnglish": "bitcoin",
            "symbol": "BTC",
            "webInterfacePort": "8332",
            "network": "regtest",
            "feeSats": 1500
        }
    ]"#;

    #[test]
    fn registry_resolves_configured_coins() {
        let registry = CoinRegistry::from_json(COINS).unwrap();
        let sky = registry.resolve("skycoin").unwrap();
        assert_eq!(sky.family(), CoinFamily::Skycoin);
        assert_eq!(sky.logo_url, "static/skycoin.logo.png");
        assert_eq!(sky.fee(), 0);

        let btc = registry.resolve("bitcoin").unwrap();
        assert_eq!(btc.family(), CoinFamily::Bitcoin);
        assert_eq!(btc.bitcoin_network().unwrap(), Network::Regtest);
        assert_eq!(btc.fee(), 1500);
    }

    #[test]
    fn unknown_coin_is_unsupported() {
        let registry = CoinRegistry::from_json(COINS).unwrap();
        assert!(matches!(
            registry.resolve("dogecoin"),
            Err(GatewayError::UnsupportedCoinType { coin_type }) if coin_type == "dogecoin"
        ));
    }

    #[test]
    fn explicit_family_overrides_the_name() {
        let json =
            r#"[{"nameInEnglish": "mzcoin", "webInterfacePort": "7420", "family": "skycoin"}]"#;
        let registry = CoinRegistry::from_json(json).unwrap();
        assert_eq!(registry.resolve("mzcoin").unwrap().family(), CoinFamily::Skycoin);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = CoinRegistry::load(Path::new("/nonexistent/coins.config.json")).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn server_url_loses_trailing_slash() {
        let config = GatewayConfig::new(CoinRegistry::default()).with_server("http://node:6789/");
        assert_eq!(config.server_url, "http://node:6789");
    }
}
