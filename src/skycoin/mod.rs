//! Skycoin-family chains: address format, transaction wire format and
//! input signing.

mod address;
mod sign;
mod wire;

pub use address::{ADDRESS_VERSION, AddressError, SkyAddress};
pub use sign::{recover_address, sign_draft};
pub use wire::{SkyOutput, SkyTransaction, add_sha256, sum_sha256};

use bitcoin::secp256k1::{All, Secp256k1};

use crate::error::Result;
use crate::types::{AddressKeySet, RawTransaction, TransactionDraft};

/// Signs and serializes a draft, returning its id and hex encoding.
pub fn sign_and_serialize(
    draft: &TransactionDraft,
    keys: &AddressKeySet,
    secp: &Secp256k1<All>,
) -> Result<RawTransaction> {
    let tx = sign_draft(draft, keys, secp)?;
    let bytes = tx.serialize()?;
    Ok(RawTransaction {
        txid: hex::encode(sum_sha256(&bytes)),
        hex: hex::encode(bytes),
    })
}
