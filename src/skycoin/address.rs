use std::fmt;
use std::str::FromStr;

use bitcoin::base58;
use bitcoin::hashes::{Hash, ripemd160, sha256};
use bitcoin::secp256k1::PublicKey;
use thiserror::Error;

pub const ADDRESS_VERSION: u8 = 0;
const ENCODED_LEN: usize = 20 + 1 + 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58: {0}")]
    Base58(String),

    #[error("invalid address length {0}")]
    Length(usize),

    #[error("invalid address checksum")]
    Checksum,

    #[error("invalid address version {0}")]
    Version(u8),
}

/// A Skycoin-family address: version byte plus RIPEMD160 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkyAddress {
    pub version: u8,
    pub key: [u8; 20],
}

impl SkyAddress {
    /// key = RIPEMD160(SHA256(SHA256(compressed pubkey)))
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let r1 = sha256::Hash::hash(&public_key.serialize());
        let r2 = sha256::Hash::hash(r1.as_byte_array());
        SkyAddress {
            version: ADDRESS_VERSION,
            key: ripemd160::Hash::hash(r2.as_byte_array()).to_byte_array(),
        }
    }

    pub fn checksum(&self) -> [u8; 4] {
        let mut data = [0u8; 21];
        data[..20].copy_from_slice(&self.key);
        data[20] = self.version;
        let digest = sha256::Hash::hash(&data).to_byte_array();
        [digest[0], digest[1], digest[2], digest[3]]
    }

    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut bytes = [0u8; ENCODED_LEN];
        bytes[..20].copy_from_slice(&self.key);
        bytes[20] = self.version;
        bytes[21..].copy_from_slice(&self.checksum());
        bytes
    }
}

impl fmt::Display for SkyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58::encode(&self.to_bytes()))
    }
}

impl FromStr for SkyAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = base58::decode(s).map_err(|e| AddressError::Base58(e.to_string()))?;
        if bytes.len() != ENCODED_LEN {
            return Err(AddressError::Length(bytes.len()));
        }

        let mut key = [0u8; 20];
        key.copy_from_slice(&bytes[..20]);
        let address = SkyAddress {
            version: bytes[20],
            key,
        };
        if address.checksum()[..] != bytes[21..] {
            return Err(AddressError::Checksum);
        }
        if address.version != ADDRESS_VERSION {
            return Err(AddressError::Version(address.version));
        }
        Ok(address)
    }
}
