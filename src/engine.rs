//! Entry points the gateway calls: build and sign a spend, submit it, and
//! derive address streams.

use bitcoin::secp256k1::{All, PublicKey, Secp256k1};

use crate::amount::parse_amount;
use crate::btc;
use crate::config::{CoinFamily, CoinMeta, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::keys::{self, DerivedAddresses, Seed};
use crate::node::{OutputSource, SubmitError, TransactionSubmitter};
use crate::selection::select;
use crate::skycoin::{self, SkyAddress};
use crate::transaction::{OutputLayout, build_draft};
use crate::types::{AddressKeySet, Balance, RawTransaction, SpendPlan, UnspentOutput};

/// One spend as the gateway receives it: comma separated input addresses
/// with their private keys in the same order, and a decimal amount.
#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'r> {
    pub coin_type: &'r str,
    pub input_addresses: &'r str,
    pub private_keys: &'r str,
    pub destination: &'r str,
    pub amount: &'r str,
}

pub struct Engine<'a> {
    config: &'a GatewayConfig,
    secp: Secp256k1<All>,
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a GatewayConfig) -> Self {
        Engine {
            config,
            secp: Secp256k1::new(),
        }
    }

    pub fn coin(&self, coin_type: &str) -> Result<&'a CoinMeta> {
        self.config.coins.resolve(coin_type)
    }

    /// Parses a caller-facing amount into the coin's smallest unit.
    pub fn parse_amount(&self, coin: &CoinMeta, text: &str) -> Result<u64> {
        let family = coin.family();
        let amount = parse_amount(text, family.decimals(), family.max_precision())?;
        if amount == 0 {
            return Err(GatewayError::malformed("amount must be positive"));
        }
        Ok(amount)
    }

    pub fn validate_address(&self, coin: &CoinMeta, address: &str) -> Result<()> {
        match coin.family() {
            CoinFamily::Skycoin => address
                .parse::<SkyAddress>()
                .map(|_| ())
                .map_err(|e| GatewayError::malformed(format!("address {address}: {e}"))),
            CoinFamily::Bitcoin => btc::parse_address(address, coin.bitcoin_network()?).map(|_| ()),
        }
    }

    /// Select, split, build, sign and serialize in one synchronous pass.
    pub fn assemble(
        &self,
        coin: &CoinMeta,
        outputs: Vec<UnspentOutput>,
        keys: &AddressKeySet,
        destination: &str,
        amount: u64,
    ) -> Result<RawTransaction> {
        let fee = coin.fee();
        let target = amount
            .checked_add(fee)
            .ok_or_else(|| GatewayError::malformed("amount plus fee overflows"))?;

        let selection = select(outputs, target)?;
        let plan = SpendPlan::new(selection.chosen, amount, fee)?;
        let change_address = plan
            .change_address()
            .ok_or_else(|| GatewayError::malformed("no outputs selected"))?
            .to_string();
        log::info!(
            "[{}] 入力 {} 件 (合計 {}) から {} を送金します。おつり: {}",
            coin.name_in_english,
            plan.chosen.len(),
            plan.total_coins,
            amount,
            plan.change
        );

        let raw = match coin.family() {
            CoinFamily::Skycoin => {
                // コインアワーはおつりの有無で配分が変わる
                let hours = self.config.hours.split(plan.total_hours, plan.change > 0);
                let draft =
                    build_draft(&plan, destination, &change_address, hours, OutputLayout::SKYCOIN)?;
                skycoin::sign_and_serialize(&draft, keys, &self.secp)?
            }
            CoinFamily::Bitcoin => {
                let network = coin.bitcoin_network()?;
                let draft = build_draft(
                    &plan,
                    destination,
                    &change_address,
                    Default::default(),
                    OutputLayout::BITCOIN,
                )?;
                btc::sign_and_serialize(&draft, keys, network, &self.secp)?
            }
        };
        log::info!("[{}] Raw transaction {}: {}", coin.name_in_english, raw.txid, raw.hex);
        Ok(raw)
    }

    /// Fetches the outputs of the input addresses and assembles a signed
    /// spend of the requested amount to the destination.
    pub async fn build_and_sign<S: OutputSource>(
        &self,
        source: &S,
        request: &SendRequest<'_>,
    ) -> Result<RawTransaction> {
        let coin = self.coin(request.coin_type)?;
        let keys = AddressKeySet::from_csv(request.input_addresses, request.private_keys)?;
        let amount = self.parse_amount(coin, request.amount)?;
        self.validate_address(coin, request.destination)?;

        let outputs = source.fetch_outputs(coin, &keys.addresses()).await?;
        self.assemble(coin, outputs, &keys, request.destination, amount)
    }

    /// Builds, signs and submits a spend, returning the node's transaction id.
    pub async fn send_coins<S: OutputSource, T: TransactionSubmitter>(
        &self,
        source: &S,
        submitter: &T,
        request: &SendRequest<'_>,
    ) -> Result<String> {
        let raw = self.build_and_sign(source, request).await?;
        self.submit(submitter, self.coin(request.coin_type)?, &raw).await
    }

    /// Submits `raw`. After a transport failure the node is asked whether it
    /// already has the transaction before a single resubmission.
    pub async fn submit<T: TransactionSubmitter>(
        &self,
        submitter: &T,
        coin: &CoinMeta,
        raw: &RawTransaction,
    ) -> Result<String> {
        let first = match submitter.submit(coin, &raw.hex).await {
            Ok(txid) => return Ok(self.accepted(coin, raw, txid)),
            Err(SubmitError::Rejected(reason)) => return Err(rejected(coin, reason)),
            Err(SubmitError::Transport(reason)) => reason,
        };
        log::warn!(
            "[{}] {} の送信に失敗しました ({})。トランザクションの状態を確認します。",
            coin.name_in_english,
            raw.txid,
            first
        );

        match submitter.is_known(coin, &raw.txid).await {
            Ok(true) => {
                log::info!("[{}] ノードは既に {} を保持しています。", coin.name_in_english, raw.txid);
                return Ok(raw.txid.clone());
            }
            // 未到達なので一度だけ再送する
            Ok(false) => {}
            Err(e) => {
                return Err(GatewayError::SubmissionUnconfirmed {
                    txid: raw.txid.clone(),
                    reason: format!("{first}; status check failed: {e}"),
                });
            }
        }

        match submitter.submit(coin, &raw.hex).await {
            Ok(txid) => Ok(self.accepted(coin, raw, txid)),
            Err(SubmitError::Rejected(reason)) => Err(rejected(coin, reason)),
            Err(SubmitError::Transport(reason)) => Err(GatewayError::SubmissionUnconfirmed {
                txid: raw.txid.clone(),
                reason,
            }),
        }
    }

    fn accepted(&self, coin: &CoinMeta, raw: &RawTransaction, txid: String) -> String {
        if txid != raw.txid {
            log::warn!(
                "[{}] ノードが報告した txid {} はローカルの {} と異なります。",
                coin.name_in_english,
                txid,
                raw.txid
            );
        }
        log::info!("[{}] {} を送信しました。", coin.name_in_english, txid);
        txid
    }

    /// Derives `qty` addresses for `coin_type` from `seed`.
    pub fn derive_addresses(
        &self,
        coin_type: &str,
        seed: Seed<'_>,
        qty: usize,
    ) -> Result<DerivedAddresses> {
        let coin = self.coin(coin_type)?;
        match coin.family() {
            CoinFamily::Skycoin => keys::derive_entries(seed, qty, &self.secp, |pk| {
                Ok(SkyAddress::from_public_key(pk).to_string())
            }),
            CoinFamily::Bitcoin => {
                let network = coin.bitcoin_network()?;
                keys::derive_entries(seed, qty, &self.secp, |pk: &PublicKey| {
                    let public = bitcoin::PublicKey::new(*pk);
                    Ok(bitcoin::Address::p2pkh(public.pubkey_hash(), network).to_string())
                })
            }
        }
    }

    /// Totals of the spendable outputs of `addresses`.
    pub async fn balance<S: OutputSource>(
        &self,
        source: &S,
        coin_type: &str,
        addresses: &str,
    ) -> Result<Balance> {
        let coin = self.coin(coin_type)?;
        let addresses: Vec<String> = addresses
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        if addresses.is_empty() {
            return Err(GatewayError::malformed("no addresses given"));
        }
        let outputs = source.fetch_outputs(coin, &addresses).await?;
        Ok(Balance::of(&outputs))
    }
}

fn rejected(coin: &CoinMeta, reason: String) -> GatewayError {
    log::error!("[{}] Raw transactionの送信が拒否されました: {}", coin.name_in_english, reason);
    GatewayError::SubmissionRejected { reason }
}
