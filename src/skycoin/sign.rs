use std::str::FromStr;

use bitcoin::secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use bitcoin::secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use super::address::SkyAddress;
use super::wire::{Sha256, Sig, SkyTransaction, add_sha256};
use crate::error::{GatewayError, Result};
use crate::types::{AddressKeySet, TransactionDraft};

fn parse_hash(hex_hash: &str) -> Result<Sha256> {
    let bytes = hex::decode(hex_hash)
        .map_err(|e| GatewayError::malformed(format!("invalid output hash {hex_hash}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| GatewayError::malformed(format!("output hash {hex_hash} is not 32 bytes")))
}

fn parse_address(text: &str) -> Result<SkyAddress> {
    SkyAddress::from_str(text).map_err(|e| GatewayError::malformed(format!("address {text}: {e}")))
}

/// Looks up and checks the secret for one input address.
fn secret_for(keys: &AddressKeySet, address: &str, secp: &Secp256k1<All>) -> Result<SecretKey> {
    let hex_key = keys.get(address).ok_or_else(|| GatewayError::MissingKey {
        address: address.to_string(),
    })?;
    let secret = SecretKey::from_str(hex_key)
        .map_err(|e| GatewayError::malformed(format!("private key for {address}: {e}")))?;

    let owner = SkyAddress::from_public_key(&PublicKey::from_secret_key(secp, &secret));
    if owner.to_string() != address {
        return Err(GatewayError::malformed(format!(
            "private key supplied for {address} belongs to {owner}"
        )));
    }
    Ok(secret)
}

fn sign_hash(hash: &Sha256, secret: &SecretKey, secp: &Secp256k1<All>) -> Sig {
    let signature = secp.sign_ecdsa_recoverable(&Message::from_digest(*hash), secret);
    let (recovery_id, compact) = signature.serialize_compact();
    let mut sig = [0u8; 65];
    sig[..64].copy_from_slice(&compact);
    sig[64] = recovery_id.to_i32() as u8;
    sig
}

/// Recovers the signer of `sig` over `hash`.
pub fn recover_address(hash: &Sha256, sig: &Sig, secp: &Secp256k1<All>) -> Result<SkyAddress> {
    let invalid =
        |reason: String| GatewayError::SerializationFailure(format!("invalid signature: {reason}"));
    // 末尾1バイトがリカバリーID、先頭64バイトがコンパクト署名
    let recovery_id =
        RecoveryId::from_i32(i32::from(sig[64])).map_err(|e| invalid(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&sig[..64], recovery_id)
        .map_err(|e| invalid(e.to_string()))?;
    let public_key = secp
        .recover_ecdsa(&Message::from_digest(*hash), &signature)
        .map_err(|e| invalid(e.to_string()))?;
    Ok(SkyAddress::from_public_key(&public_key))
}

/// Converts a draft to a Skycoin transaction and signs every input with the
/// key of the address that owns it. Signatures are index-aligned with the
/// inputs.
pub fn sign_draft(
    draft: &TransactionDraft,
    keys: &AddressKeySet,
    secp: &Secp256k1<All>,
) -> Result<SkyTransaction> {
    let mut tx = SkyTransaction::default();
    let mut secrets = Vec::with_capacity(draft.inputs.len());

    // 入力ごとに所有アドレスの秘密鍵を引き当てる (入力と同じ順序)
    for input in &draft.inputs {
        tx.push_input(parse_hash(&input.id.hash)?);
        secrets.push(secret_for(keys, &input.address, secp)?);
    }
    for output in &draft.outputs {
        tx.push_output(parse_address(&output.address)?, output.coins, output.hours);
    }

    log::info!("トランザクション署名処理を開始します。入力数: {}", tx.inputs.len());

    // 署名対象は SHA256(inner_hash || 入力ハッシュ)
    let inner_hash = tx.hash_inner()?;
    tx.sigs = tx
        .inputs
        .iter()
        .zip(&secrets)
        .map(|(input, secret)| sign_hash(&add_sha256(&inner_hash, input), secret, secp))
        .collect();
    tx.update_header()?;

    // 署名から復元したアドレスが入力の所有者と一致することを確認
    for (input_index, (input, sig)) in tx.inputs.iter().zip(&tx.sigs).enumerate() {
        let signer = recover_address(&add_sha256(&tx.inner_hash, input), sig, secp)?;
        if signer.to_string() != draft.inputs[input_index].address {
            return Err(GatewayError::Signing {
                input_index,
                reason: format!("signature recovers to {signer}"),
            });
        }
    }
    log::info!("全ての入力の署名が完了しました。");

    Ok(tx)
}
