//! The two network collaborators of the engine and their HTTP
//! implementation against the gateway's per-coin endpoints.

use std::future::Future;

use serde::Deserialize;
use thiserror::Error;

use crate::amount::parse_amount;
use crate::config::{CoinFamily, CoinMeta, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::types::{OutputId, UnspentOutput};

const GET_SUPPORTED_COINS: &str = "getSupportedCoins";
const GET_BALANCE: &str = "getBalance";
const GET_OUTPUTS: &str = "getOutputs";
const INJECT_TRANSACTION: &str = "injectTransaction";
const GET_TRANSACTION: &str = "transaction";

/// Supplies the current unspent outputs of a set of addresses.
pub trait OutputSource {
    fn fetch_outputs(
        &self,
        coin: &CoinMeta,
        addresses: &[String],
    ) -> impl Future<Output = Result<Vec<UnspentOutput>>> + Send;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The node answered and refused the transaction.
    #[error("{0}")]
    Rejected(String),

    /// No usable answer; the node may or may not have the transaction.
    #[error("{0}")]
    Transport(String),
}

/// Hands serialized transactions to a node.
pub trait TransactionSubmitter {
    /// Returns the transaction id reported by the node.
    fn submit(
        &self,
        coin: &CoinMeta,
        raw_tx: &str,
    ) -> impl Future<Output = Result<String, SubmitError>> + Send;

    /// Whether the node already knows `txid`.
    fn is_known(
        &self,
        coin: &CoinMeta,
        txid: &str,
    ) -> impl Future<Output = Result<bool, SubmitError>> + Send;
}

/// Spendable output as returned by a Skycoin-family node.
#[derive(Debug, Deserialize)]
struct ReadableOutput {
    hash: String,
    address: String,
    coins: String,
    #[serde(default)]
    calculated_hours: u64,
}

/// Unspent output as returned for bitcoin.
#[derive(Debug, Deserialize)]
struct BtcUtxo {
    txid: String,
    vout: u32,
    address: String,
    amount: u64,
}

/// Decodes a node's output listing into engine outputs.
pub fn decode_outputs(family: CoinFamily, body: &str) -> Result<Vec<UnspentOutput>> {
    match family {
        CoinFamily::Skycoin => {
            let readable: Vec<ReadableOutput> = serde_json::from_str(body)?;
            readable
                .into_iter()
                .map(|o| -> Result<UnspentOutput> {
                    Ok(UnspentOutput {
                        id: OutputId { hash: o.hash, index: 0 },
                        coins: parse_amount(&o.coins, family.decimals(), family.decimals())?,
                        address: o.address,
                        hours: o.calculated_hours,
                    })
                })
                .collect()
        }
        CoinFamily::Bitcoin => {
            let utxos: Vec<BtcUtxo> = serde_json::from_str(body)?;
            Ok(utxos
                .into_iter()
                .map(|u| UnspentOutput {
                    id: OutputId {
                        hash: u.txid,
                        index: u.vout,
                    },
                    address: u.address,
                    coins: u.amount,
                    hours: 0,
                })
                .collect())
        }
    }
}

/// HTTP client for the gateway server that fronts every coin node.
#[derive(Debug, Clone)]
pub struct HttpNode {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNode {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpNode {
            base_url: config.server_url.clone(),
            client,
        })
    }

    fn url(&self, coin: &CoinMeta, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, coin.name_in_english, endpoint)
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<String, String> {
        log::info!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("{}: {}", status, body.trim()));
        }
        Ok(body)
    }

    /// GET a JSON document. Any failure, including an unparsable body,
    /// means the node could not serve the request.
    async fn get_json(
        &self,
        coin_type: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let unavailable = |reason: String| {
            log::error!("{} からの応答を取得できませんでした: {}", url, reason);
            GatewayError::OutputSourceUnavailable {
                coin_type: coin_type.to_string(),
                reason,
            }
        };
        let body = self.get_text(url, query).await.map_err(unavailable)?;
        serde_json::from_str(&body)
            .map_err(|e| unavailable(format!("invalid JSON from node: {e}")))
    }

    /// Confirmed and predicted balance of `addresses`, as reported by the node.
    pub async fn balance(
        &self,
        coin: &CoinMeta,
        addresses: &[String],
    ) -> Result<serde_json::Value> {
        let addrs = addresses.join(",");
        self.get_json(
            &coin.name_in_english,
            &self.url(coin, GET_BALANCE),
            &[("addrs", addrs.as_str())],
        )
        .await
    }

    /// A transaction as the node reports it.
    pub async fn transaction(&self, coin: &CoinMeta, txid: &str) -> Result<serde_json::Value> {
        self.get_json(&coin.name_in_english, &self.url(coin, GET_TRANSACTION), &[("txid", txid)])
            .await
    }

    /// Coin metadata as served by the gateway.
    pub async fn supported_coins(&self) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, GET_SUPPORTED_COINS);
        self.get_json("gateway", &url, &[]).await
    }
}

impl OutputSource for HttpNode {
    async fn fetch_outputs(
        &self,
        coin: &CoinMeta,
        addresses: &[String],
    ) -> Result<Vec<UnspentOutput>> {
        let addrs = addresses.join(",");
        let unavailable = |reason: String| {
            log::error!("{} の未使用出力の取得に失敗しました: {}", coin.name_in_english, reason);
            GatewayError::OutputSourceUnavailable {
                coin_type: coin.name_in_english.clone(),
                reason,
            }
        };

        let body = self
            .get_text(&self.url(coin, GET_OUTPUTS), &[("addrs", addrs.as_str())])
            .await
            .map_err(unavailable)?;
        let outputs = decode_outputs(coin.family(), &body).map_err(|e| unavailable(e.to_string()))?;
        log::debug!("{} の未使用出力 {} 件を取得しました。", addrs, outputs.len());
        Ok(outputs)
    }
}

impl TransactionSubmitter for HttpNode {
    async fn submit(&self, coin: &CoinMeta, raw_tx: &str) -> Result<String, SubmitError> {
        let url = self.url(coin, INJECT_TRANSACTION);
        log::info!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "rawtx": raw_tx }))
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| SubmitError::Transport(e.to_string()))?;
        if status.is_success() {
            Ok(body.trim().trim_matches('"').to_string())
        } else if status.is_server_error() && body.trim().is_empty() {
            Err(SubmitError::Transport(format!("{status} without a reason")))
        } else {
            Err(SubmitError::Rejected(body.trim().to_string()))
        }
    }

    async fn is_known(&self, coin: &CoinMeta, txid: &str) -> Result<bool, SubmitError> {
        let resp = self
            .client
            .get(self.url(coin, GET_TRANSACTION))
            .query(&[("txid", txid)])
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }
}
