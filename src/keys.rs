//! Seeds and deterministic key streams.
//!
//! The stream is Skycoin's deterministic key-pair iterator. Each step
//! derives `next = secp256k1_hash(state)` and the secret from
//! `SHA256(state || next)`. The returned `lastseed` is `hex(next)` after
//! the final step; resuming from it continues the same stream.

use bip39::{Language, Mnemonic};
use bitcoin::secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::skycoin::sum_sha256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    #[serde(rename = "pubkey")]
    pub public: String,
    #[serde(rename = "seckey")]
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddresses {
    #[serde(rename = "lastseed")]
    pub last_seed: String,
    pub addrs: Vec<AddressEntry>,
}

/// Where a key stream starts.
///
/// `Text` is a mnemonic or any other passphrase and is used as its UTF-8
/// bytes, even when it happens to look like hex. `Resume` is a `lastseed`
/// returned by an earlier derivation and must decode to 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed<'a> {
    Text(&'a str),
    Resume(&'a str),
}

impl Seed<'_> {
    fn state(&self) -> Result<Vec<u8>> {
        match *self {
            Seed::Text("") | Seed::Resume("") => Err(GatewayError::malformed("seed is empty")),
            Seed::Text(text) => Ok(text.as_bytes().to_vec()),
            Seed::Resume(last_seed) => {
                let raw = hex::decode(last_seed.trim())
                    .map_err(|e| GatewayError::malformed(format!("last seed is not hex: {e}")))?;
                if raw.len() != 32 {
                    return Err(GatewayError::malformed(format!(
                        "last seed must be 32 bytes, got {}",
                        raw.len()
                    )));
                }
                Ok(raw)
            }
        }
    }
}

/// A fresh 12-word English mnemonic (128 bits of entropy).
pub fn new_seed() -> Result<String> {
    let mnemonic = Mnemonic::generate_in(Language::English, 12)
        .map_err(|e| GatewayError::malformed(format!("failed to generate seed: {e}")))?;
    Ok(mnemonic.to_string())
}

/// First valid scalar in the chain `SHA256(seed)`, `SHA256(SHA256(seed))`, ...
fn deterministic_secret(seed: &[u8]) -> SecretKey {
    let mut candidate = sum_sha256(seed);
    loop {
        match SecretKey::from_slice(&candidate) {
            Ok(secret) => return secret,
            // 範囲外のスカラーは確率的にほぼ起こらないが、再ハッシュして続行
            Err(_) => candidate = sum_sha256(&candidate),
        }
    }
}

/// `SHA256(h || ECDH(pub(SHA256(h)), sec(h)))` with `h = SHA256(data)`.
pub fn secp256k1_hash(secp: &Secp256k1<All>, data: &[u8]) -> Result<[u8; 32]> {
    let hash = sum_sha256(data);
    let secret = deterministic_secret(&hash);
    let public = PublicKey::from_secret_key(secp, &deterministic_secret(&sum_sha256(&hash)));

    // ECDH: 公開鍵に秘密鍵スカラーを掛け、圧縮形式 (33バイト) を使う
    let shared = public
        .mul_tweak(secp, &Scalar::from(secret))
        .map_err(|e| GatewayError::malformed(format!("key derivation failed: {e}")))?;

    let mut material = Vec::with_capacity(32 + 33);
    material.extend_from_slice(&hash);
    material.extend_from_slice(&shared.serialize());
    Ok(sum_sha256(&material))
}

fn step(secp: &Secp256k1<All>, state: &[u8]) -> Result<([u8; 32], SecretKey)> {
    let next = secp256k1_hash(secp, state)?;
    let mut material = Vec::with_capacity(state.len() + 32);
    material.extend_from_slice(state);
    material.extend_from_slice(&next);
    Ok((next, deterministic_secret(&sum_sha256(&material))))
}

/// Derives `qty` secret keys from `seed` and the seed to continue from.
pub fn generate_key_pairs(
    secp: &Secp256k1<All>,
    seed: Seed<'_>,
    qty: usize,
) -> Result<(String, Vec<SecretKey>)> {
    if qty == 0 {
        return Err(GatewayError::malformed("quantity of addresses must be positive"));
    }

    let mut state = seed.state()?;
    let mut secrets = Vec::with_capacity(qty);
    for _ in 0..qty {
        let (next, secret) = step(secp, &state)?;
        secrets.push(secret);
        state = next.to_vec();
    }
    Ok((hex::encode(state), secrets))
}

/// Derives `qty` address entries, rendering each address with `render`.
pub fn derive_entries(
    seed: Seed<'_>,
    qty: usize,
    secp: &Secp256k1<All>,
    render: impl Fn(&PublicKey) -> Result<String>,
) -> Result<DerivedAddresses> {
    let (last_seed, secrets) = generate_key_pairs(secp, seed, qty)?;
    log::debug!("{} 個の鍵を導出しました。", secrets.len());
    let addrs = secrets
        .iter()
        .map(|secret| {
            let public = PublicKey::from_secret_key(secp, secret);
            Ok(AddressEntry {
                address: render(&public)?,
                public: hex::encode(public.serialize()),
                secret: hex::encode(secret.secret_bytes()),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DerivedAddresses { last_seed, addrs })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = concat!(
        "abandon abandon abandon abandon abandon abandon ",
        "abandon abandon abandon abandon abandon about"
    );

    fn raw(hex_str: &str) -> Vec<u8> {
        hex::decode(hex_str).unwrap()
    }

    #[test]
    fn secp256k1_hash_matches_published_vectors() {
        let secp = Secp256k1::new();
        let cases = [
            (
                "90c56f5b8d78a46fb4cddf6fd9c6d88d6d2d7b0ec35917c7dac12c03b04e444e",
                "a70c36286be722d8111e69e910ce4490005bbf9135b0ce8e7a59f84eee24b88b",
            ),
            (
                "a3b08ccf8cbae4955c02f223be1f97d2bb41d92b7f0c516eb8467a17da1e6057",
                "e9db072fe5817325504174253a056be7b53b512f1e588f576f1f5a82cdcad302",
            ),
        ];
        for (seed, expected) in cases {
            assert_eq!(hex::encode(secp256k1_hash(&secp, &raw(seed)).unwrap()), expected);
        }
    }

    #[test]
    fn first_secret_matches_published_vectors() {
        let secp = Secp256k1::new();
        let cases = [
            (
                "90c56f5b8d78a46fb4cddf6fd9c6d88d6d2d7b0ec35917c7dac12c03b04e444e",
                "94dd1a9de9ffd57b5516b8a7f090da67f142f7d22356fa5d1b894ee4d4fba95b",
            ),
            (
                "a3b08ccf8cbae4955c02f223be1f97d2bb41d92b7f0c516eb8467a17da1e6057",
                "82fba4cc2bc29eef122f116f45d01d82ff488d7ee713f8a95c162a64097239e0",
            ),
        ];
        for (seed, expected) in cases {
            let (_, secret) = step(&secp, &raw(seed)).unwrap();
            assert_eq!(hex::encode(secret.secret_bytes()), expected);
        }
    }

    #[test]
    fn last_seed_is_the_secp256k1_hash() {
        let secp = Secp256k1::new();
        let seed = "90c56f5b8d78a46fb4cddf6fd9c6d88d6d2d7b0ec35917c7dac12c03b04e444e";
        let (last, secrets) = generate_key_pairs(&secp, Seed::Resume(seed), 1).unwrap();
        assert_eq!(last, "a70c36286be722d8111e69e910ce4490005bbf9135b0ce8e7a59f84eee24b88b");
        assert_eq!(
            hex::encode(secrets[0].secret_bytes()),
            "94dd1a9de9ffd57b5516b8a7f090da67f142f7d22356fa5d1b894ee4d4fba95b"
        );
    }

    #[test]
    fn same_seed_same_keys() {
        let secp = Secp256k1::new();
        let (next_a, keys_a) = generate_key_pairs(&secp, Seed::Text(SEED), 3).unwrap();
        let (next_b, keys_b) = generate_key_pairs(&secp, Seed::Text(SEED), 3).unwrap();
        assert_eq!(next_a, next_b);
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn keys_in_a_stream_are_distinct() {
        let secp = Secp256k1::new();
        let (_, keys) = generate_key_pairs(&secp, Seed::Text(SEED), 5).unwrap();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn last_seed_continues_the_stream() {
        let secp = Secp256k1::new();
        let (_, all) = generate_key_pairs(&secp, Seed::Text(SEED), 3).unwrap();
        let (next, first_two) = generate_key_pairs(&secp, Seed::Text(SEED), 2).unwrap();
        let (_, third) = generate_key_pairs(&secp, Seed::Resume(&next), 1).unwrap();
        assert_eq!(&all[..2], &first_two[..]);
        assert_eq!(all[2], third[0]);
    }

    #[test]
    fn hex_looking_text_is_not_resumed() {
        let secp = Secp256k1::new();
        let seed = "90c56f5b8d78a46fb4cddf6fd9c6d88d6d2d7b0ec35917c7dac12c03b04e444e";
        let (_, as_text) = generate_key_pairs(&secp, Seed::Text(seed), 1).unwrap();
        let (_, resumed) = generate_key_pairs(&secp, Seed::Resume(seed), 1).unwrap();
        assert_ne!(as_text, resumed);
    }

    #[test]
    fn bad_resume_seeds_are_rejected() {
        let secp = Secp256k1::new();
        for seed in ["", "not hex", "abcd", SEED] {
            let err = generate_key_pairs(&secp, Seed::Resume(seed), 1).unwrap_err();
            assert!(matches!(err, GatewayError::MalformedInput(_)));
        }
    }

    #[test]
    fn zero_quantity_and_empty_seed_are_rejected() {
        let secp = Secp256k1::new();
        assert!(generate_key_pairs(&secp, Seed::Text(SEED), 0).is_err());
        assert!(generate_key_pairs(&secp, Seed::Text(""), 1).is_err());
    }

    #[test]
    fn new_seeds_are_twelve_words_and_unique() {
        let a = new_seed().unwrap();
        let b = new_seed().unwrap();
        assert_eq!(a.split_whitespace().count(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn entries_expose_matching_public_keys() {
        let secp = Secp256k1::new();
        let derived =
            derive_entries(Seed::Text(SEED), 2, &secp, |pk| Ok(hex::encode(pk.serialize())))
                .unwrap();
        assert_eq!(derived.addrs.len(), 2);
        for entry in &derived.addrs {
            assert_eq!(entry.address, entry.public);
            assert_eq!(entry.public.len(), 66);
            assert_eq!(entry.secret.len(), 64);
        }
        let json = serde_json::to_value(&derived).unwrap();
        assert!(json.get("lastseed").is_some());
        assert!(json["addrs"][0].get("seckey").is_some());
    }
}
