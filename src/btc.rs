use std::str::FromStr;

use bitcoin::{
    Address, Amount, Network, NetworkKind, OutPoint, PrivateKey, PublicKey, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
    absolute::LockTime,
    consensus::encode,
    hashes::Hash,
    script::{Builder, PushBytesBuf},
    secp256k1::{All, Message, Secp256k1, SecretKey},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
};

use crate::error::{GatewayError, Result};
use crate::types::{AddressKeySet, RawTransaction, TransactionDraft};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScriptType {
    P2PKH,
    P2WPKH,
}

impl ScriptType {
    pub fn from_script(script: &ScriptBuf) -> Result<Self> {
        if script.is_p2pkh() {
            Ok(ScriptType::P2PKH)
        } else if script.is_p2wpkh() {
            Ok(ScriptType::P2WPKH)
        } else {
            // P2SH や P2TR などは未対応
            Err(GatewayError::malformed(format!(
                "unsupported script type {}",
                script.to_hex_string()
            )))
        }
    }
}

// 署名に必要な情報を入力ごとにまとめたもの
struct PreparedInput {
    out_point: OutPoint,
    script_pubkey: ScriptBuf,
    script_type: ScriptType,
    value: Amount, // P2WPKH の署名ハッシュには入力金額が必要
    private_key: PrivateKey,
    public_key: PublicKey,
}

pub fn parse_address(text: &str, network: Network) -> Result<Address> {
    Address::from_str(text)
        .and_then(|addr| addr.require_network(network))
        .map_err(|e| GatewayError::malformed(format!("address {text} for {network}: {e}")))
}

/// Accepts WIF or 64-digit hex.
pub fn parse_private_key(text: &str, network: Network) -> Result<PrivateKey> {
    if let Ok(key) = PrivateKey::from_wif(text) {
        // WIF はネットワーク種別を含むので一致を確認する
        if key.network != NetworkKind::from(network) {
            return Err(GatewayError::malformed(format!(
                "WIF key is for {:?}, expected {network}",
                key.network
            )));
        }
        return Ok(key);
    }
    let secret = SecretKey::from_str(text)
        .map_err(|e| GatewayError::malformed(format!("private key: {e}")))?;
    Ok(PrivateKey::new(secret, network))
}

fn script_for_key(public_key: &PublicKey, script_type: ScriptType) -> Result<ScriptBuf> {
    match script_type {
        ScriptType::P2PKH => Ok(ScriptBuf::new_p2pkh(&public_key.pubkey_hash())),
        ScriptType::P2WPKH => public_key
            .wpubkey_hash()
            .map(|hash| ScriptBuf::new_p2wpkh(&hash))
            .map_err(|e| GatewayError::malformed(e.to_string())),
    }
}

fn prepare_inputs(
    draft: &TransactionDraft,
    keys: &AddressKeySet,
    network: Network,
    secp: &Secp256k1<All>,
) -> Result<Vec<PreparedInput>> {
    let mut prepared = Vec::with_capacity(draft.inputs.len());
    for input in &draft.inputs {
        let wif_or_hex = keys.get(&input.address).ok_or_else(|| GatewayError::MissingKey {
            address: input.address.clone(),
        })?;
        let private_key = parse_private_key(wif_or_hex, network)?;
        let public_key = private_key.public_key(secp);

        let txid = Txid::from_str(&input.id.hash).map_err(|e| {
            GatewayError::malformed(format!("invalid txid {}: {}", input.id.hash, e))
        })?;
        // script_pubkey はアドレスから導出する (ノードの応答には含まれない)
        let script_pubkey = parse_address(&input.address, network)?.script_pubkey();
        let script_type = ScriptType::from_script(&script_pubkey)?;

        // 秘密鍵がこのアドレスの所有者であることを確認
        if script_for_key(&public_key, script_type)? != script_pubkey {
            return Err(GatewayError::malformed(format!(
                "private key supplied for {} does not own it",
                input.address
            )));
        }

        log::debug!(
            "処理済みUTXO追加: txid={}, vout={}, value={}, type={:?}",
            input.id.hash,
            input.id.index,
            input.coins,
            script_type
        );
        prepared.push(PreparedInput {
            out_point: OutPoint::new(txid, input.id.index),
            script_pubkey,
            script_type,
            value: Amount::from_sat(input.coins),
            private_key,
            public_key,
        });
    }
    Ok(prepared)
}

/// Builds and signs a bitcoin transaction from a draft. Inputs are signed
/// with SIGHASH_ALL according to the script type of the address they
/// belong to.
pub fn sign_draft(
    draft: &TransactionDraft,
    keys: &AddressKeySet,
    network: Network,
    secp: &Secp256k1<All>,
) -> Result<Transaction> {
    let inputs = prepare_inputs(draft, keys, network, secp)?;

    let mut output = Vec::with_capacity(draft.outputs.len());
    for draft_output in &draft.outputs {
        log::debug!("出力追加: address={}, value={}", draft_output.address, draft_output.coins);
        output.push(TxOut {
            value: Amount::from_sat(draft_output.coins),
            script_pubkey: parse_address(&draft_output.address, network)?.script_pubkey(),
        });
    }

    // 署名対象のトランザクションを初期化 (script_sig と witness は空)
    let mut transaction = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|p| TxIn {
                previous_output: p.out_point,
                script_sig: ScriptBuf::new(), // 署名前は空
                sequence: Sequence::MAX,
                witness: Witness::new(), // 署名前は空
            })
            .collect(),
        output,
    };

    log::info!("トランザクション署名処理を開始します。");

    // 1. 署名ハッシュ計算フェーズ
    // SighashCache が transaction を借用するため、署名の適用より先に全て計算する
    let mut messages = Vec::with_capacity(inputs.len());
    {
        let mut cache = SighashCache::new(&transaction);
        for (input_index, input) in inputs.iter().enumerate() {
            let signing_error = |e: &dyn std::fmt::Display| GatewayError::Signing {
                input_index,
                reason: e.to_string(),
            };
            let digest = match input.script_type {
                // P2PKH: script_pubkey をそのまま script_code として使う
                ScriptType::P2PKH => cache
                    .legacy_signature_hash(
                        input_index,
                        &input.script_pubkey,
                        EcdsaSighashType::All.to_u32(),
                    )
                    .map(|h| h.to_byte_array())
                    .map_err(|e| signing_error(&e))?,
                // P2WPKH: BIP143 の署名ハッシュ (入力金額を含む)
                ScriptType::P2WPKH => cache
                    .p2wpkh_signature_hash(
                        input_index,
                        &input.script_pubkey,
                        input.value,
                        EcdsaSighashType::All,
                    )
                    .map(|h| h.to_byte_array())
                    .map_err(|e| signing_error(&e))?,
            };
            messages.push(Message::from_digest(digest));
        }
    } // ここで cache が破棄され、transaction の借用が解放される

    log::info!("全ての署名ハッシュの計算が完了しました。署名生成と適用を開始します。");

    // 2. 署名生成と適用フェーズ
    for (input_index, (input, message)) in inputs.iter().zip(messages).enumerate() {
        let signature = bitcoin::ecdsa::Signature {
            signature: secp.sign_ecdsa(&message, &input.private_key.inner),
            sighash_type: EcdsaSighashType::All,
        };
        let sig_bytes = signature.serialize().to_vec(); // DER + sighash バイト

        match input.script_type {
            ScriptType::P2PKH => {
                // script_sig = <sig> <pubkey>
                let push = PushBytesBuf::try_from(sig_bytes).map_err(|_| GatewayError::Signing {
                    input_index,
                    reason: "signature does not fit a script push".to_string(),
                })?;
                transaction.input[input_index].script_sig =
                    Builder::new().push_slice(push).push_key(&input.public_key).into_script();
            }
            ScriptType::P2WPKH => {
                // witness = [sig, pubkey]、script_sig は空のまま
                let mut witness = Witness::new();
                witness.push(sig_bytes);
                witness.push(input.public_key.to_bytes());
                transaction.input[input_index].witness = witness;
            }
        }
        log::debug!("入力 {} ({:?}) の署名適用完了。", input_index, input.script_type);
    }
    log::info!("全ての入力の署名が完了しました。");

    Ok(transaction)
}

pub fn sign_and_serialize(
    draft: &TransactionDraft,
    keys: &AddressKeySet,
    network: Network,
    secp: &Secp256k1<All>,
) -> Result<RawTransaction> {
    let transaction = sign_draft(draft, keys, network, secp)?;
    Ok(RawTransaction {
        txid: transaction.compute_txid().to_string(),
        hex: encode::serialize_hex(&transaction),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DraftOutput, OutputId, UnspentOutput};
    use bitcoin::CompressedPublicKey;

    const NETWORK: Network = Network::Regtest;

    fn keyed_address(byte: u8, segwit: bool) -> (String, String) {
        let secp = Secp256k1::new();
        let private_key = PrivateKey::new(SecretKey::from_slice(&[byte; 32]).unwrap(), NETWORK);
        let public_key = private_key.public_key(&secp);
        let address = if segwit {
            Address::p2wpkh(&CompressedPublicKey::try_from(public_key).unwrap(), NETWORK)
        } else {
            Address::p2pkh(public_key.pubkey_hash(), NETWORK)
        };
        (address.to_string(), hex::encode(private_key.inner.secret_bytes()))
    }

    fn draft(owner: &str, destination: &str) -> TransactionDraft {
        TransactionDraft {
            inputs: vec![UnspentOutput {
                id: OutputId {
                    hash: "ab".repeat(32),
                    index: 1,
                },
                address: owner.into(),
                coins: 100_000,
                hours: 0,
            }],
            outputs: vec![
                DraftOutput {
                    address: destination.into(),
                    coins: 50_000,
                    hours: 0,
                },
                DraftOutput {
                    address: owner.into(),
                    coins: 48_000,
                    hours: 0,
                },
            ],
        }
    }

    #[test]
    fn p2pkh_inputs_get_a_script_sig() {
        let secp = Secp256k1::new();
        let (owner, secret) = keyed_address(1, false);
        let (destination, _) = keyed_address(2, false);
        let keys = AddressKeySet::from_csv(&owner, &secret).unwrap();

        let tx = sign_draft(&draft(&owner, &destination), &keys, NETWORK, &secp).unwrap();
        assert!(!tx.input[0].script_sig.is_empty());
        assert!(tx.input[0].witness.is_empty());
        assert_eq!(tx.input[0].previous_output.vout, 1);
        assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
    }

    #[test]
    fn p2wpkh_inputs_get_a_witness() {
        let secp = Secp256k1::new();
        let (owner, secret) = keyed_address(3, true);
        let (destination, _) = keyed_address(4, false);
        let keys = AddressKeySet::from_csv(&owner, &secret).unwrap();

        let tx = sign_draft(&draft(&owner, &destination), &keys, NETWORK, &secp).unwrap();
        assert!(tx.input[0].script_sig.is_empty());
        assert_eq!(tx.input[0].witness.len(), 2);
    }

    #[test]
    fn serialized_hex_decodes_to_the_same_txid() {
        let secp = Secp256k1::new();
        let (owner, secret) = keyed_address(5, false);
        let (destination, _) = keyed_address(6, true);
        let keys = AddressKeySet::from_csv(&owner, &secret).unwrap();

        let raw = sign_and_serialize(&draft(&owner, &destination), &keys, NETWORK, &secp).unwrap();
        let decoded: Transaction = encode::deserialize_hex(&raw.hex).unwrap();
        assert_eq!(decoded.compute_txid().to_string(), raw.txid);
    }

    #[test]
    fn wif_keys_are_accepted() {
        let private_key = PrivateKey::new(SecretKey::from_slice(&[9u8; 32]).unwrap(), NETWORK);
        let parsed = parse_private_key(&private_key.to_wif(), NETWORK).unwrap();
        assert_eq!(parsed.inner, private_key.inner);
        assert!(parse_private_key(&private_key.to_wif(), Network::Bitcoin).is_err());
    }

    #[test]
    fn missing_and_foreign_keys_are_rejected() {
        let secp = Secp256k1::new();
        let (owner, _) = keyed_address(7, false);
        let (other, other_secret) = keyed_address(8, false);

        let keys = AddressKeySet::from_csv(&other, &other_secret).unwrap();
        let err = sign_draft(&draft(&owner, &other), &keys, NETWORK, &secp).unwrap_err();
        assert!(matches!(err, GatewayError::MissingKey { .. }));

        let keys = AddressKeySet::from_csv(&owner, &other_secret).unwrap();
        let err = sign_draft(&draft(&owner, &other), &keys, NETWORK, &secp).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedInput(_)));
    }
}
