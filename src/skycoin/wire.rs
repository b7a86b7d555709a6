//! Skycoin transaction encoding.
//!
//! Layout, all integers little-endian:
//! `length:u32 | type:u8 | inner_hash:[32] | sigs | inputs | outputs`
//! where each list is a u32 count followed by fixed-size entries.

use bitcoin::hashes::{Hash, sha256};

use super::address::SkyAddress;
use crate::error::{GatewayError, Result};

pub type Sha256 = [u8; 32];
pub type Sig = [u8; 65];

const HEADER_LEN: usize = 4 + 1 + 32;
const OUTPUT_LEN: usize = 1 + 20 + 8 + 8;
const MAX_LIST_LEN: usize = u16::MAX as usize;

pub fn sum_sha256(data: &[u8]) -> Sha256 {
    sha256::Hash::hash(data).to_byte_array()
}

/// SHA256(a || b), the per-input signing digest.
pub fn add_sha256(a: &Sha256, b: &Sha256) -> Sha256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(a);
    data[32..].copy_from_slice(b);
    sum_sha256(&data)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkyOutput {
    pub address: SkyAddress,
    pub coins: u64,
    pub hours: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SkyTransaction {
    pub length: u32,
    pub tx_type: u8,
    pub inner_hash: Sha256,
    pub sigs: Vec<Sig>,
    pub inputs: Vec<Sha256>,
    pub outputs: Vec<SkyOutput>,
}

fn put_count(buf: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    if len > MAX_LIST_LEN {
        return Err(GatewayError::SerializationFailure(format!(
            "{len} {what} exceed the limit of {MAX_LIST_LEN}"
        )));
    }
    buf.extend_from_slice(&(len as u32).to_le_bytes());
    Ok(())
}

fn encode_inputs(buf: &mut Vec<u8>, inputs: &[Sha256]) -> Result<()> {
    put_count(buf, inputs.len(), "inputs")?;
    for input in inputs {
        buf.extend_from_slice(input);
    }
    Ok(())
}

fn encode_outputs(buf: &mut Vec<u8>, outputs: &[SkyOutput]) -> Result<()> {
    put_count(buf, outputs.len(), "outputs")?;
    for output in outputs {
        buf.push(output.address.version);
        buf.extend_from_slice(&output.address.key);
        buf.extend_from_slice(&output.coins.to_le_bytes());
        buf.extend_from_slice(&output.hours.to_le_bytes());
    }
    Ok(())
}

impl SkyTransaction {
    pub fn push_input(&mut self, hash: Sha256) {
        self.inputs.push(hash);
    }

    pub fn push_output(&mut self, address: SkyAddress, coins: u64, hours: u64) {
        self.outputs.push(SkyOutput {
            address,
            coins,
            hours,
        });
    }

    /// SHA256 over the encoded inputs followed by the encoded outputs.
    pub fn hash_inner(&self) -> Result<Sha256> {
        let mut buf =
            Vec::with_capacity(8 + self.inputs.len() * 32 + self.outputs.len() * OUTPUT_LEN);
        encode_inputs(&mut buf, &self.inputs)?;
        encode_outputs(&mut buf, &self.outputs)?;
        Ok(sum_sha256(&buf))
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + 4
            + self.sigs.len() * 65
            + 4
            + self.inputs.len() * 32
            + 4
            + self.outputs.len() * OUTPUT_LEN
    }

    /// Fills in length, type and inner hash.
    pub fn update_header(&mut self) -> Result<()> {
        let len = self.encoded_len();
        self.length = u32::try_from(len).map_err(|_| {
            GatewayError::SerializationFailure(format!("transaction of {len} bytes"))
        })?;
        self.tx_type = 0;
        self.inner_hash = self.hash_inner()?;
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.length.to_le_bytes());
        buf.push(self.tx_type);
        buf.extend_from_slice(&self.inner_hash);
        put_count(&mut buf, self.sigs.len(), "signatures")?;
        for sig in &self.sigs {
            buf.extend_from_slice(sig);
        }
        encode_inputs(&mut buf, &self.inputs)?;
        encode_outputs(&mut buf, &self.outputs)?;
        Ok(buf)
    }

    /// Transaction id: SHA256 of the full encoding, hex.
    pub fn txid(&self) -> Result<String> {
        Ok(hex::encode(sum_sha256(&self.serialize()?)))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes, pos: 0 };
        let length = u32::from_le_bytes(reader.take()?);
        let tx_type = u8::from_le_bytes(reader.take()?);
        let inner_hash = reader.take()?;

        let mut sigs = Vec::new();
        for _ in 0..reader.count()? {
            sigs.push(reader.take()?);
        }
        let mut inputs = Vec::new();
        for _ in 0..reader.count()? {
            inputs.push(reader.take()?);
        }
        let mut outputs = Vec::new();
        for _ in 0..reader.count()? {
            let version = u8::from_le_bytes(reader.take()?);
            let key = reader.take()?;
            outputs.push(SkyOutput {
                address: SkyAddress { version, key },
                coins: u64::from_le_bytes(reader.take()?),
                hours: u64::from_le_bytes(reader.take()?),
            });
        }

        if reader.pos != bytes.len() {
            return Err(GatewayError::SerializationFailure(format!(
                "{} trailing bytes",
                bytes.len() - reader.pos
            )));
        }
        if length as usize != bytes.len() {
            return Err(GatewayError::SerializationFailure(format!(
                "length field {length} does not match {} bytes",
                bytes.len()
            )));
        }

        Ok(SkyTransaction {
            length,
            tx_type,
            inner_hash,
            sigs,
            inputs,
            outputs,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            GatewayError::SerializationFailure(format!(
                "unexpected end of transaction at byte {}",
                self.pos
            ))
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn count(&mut self) -> Result<usize> {
        let count = u32::from_le_bytes(self.take()?) as usize;
        if count > MAX_LIST_LEN {
            return Err(GatewayError::SerializationFailure(format!("list of {count} entries")));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> SkyAddress {
        SkyAddress {
            version: 0,
            key: [byte; 20],
        }
    }

    fn sample() -> SkyTransaction {
        let mut tx = SkyTransaction::default();
        tx.push_input([0x11; 32]);
        tx.push_input([0x22; 32]);
        tx.push_output(address(0xaa), 2_000_000, 45);
        tx.push_output(address(0xbb), 6_000_000, 5);
        tx.sigs = vec![[0x01; 65], [0x02; 65]];
        tx.update_header().unwrap();
        tx
    }

    #[test]
    fn header_length_matches_encoding() {
        let tx = sample();
        let bytes = tx.serialize().unwrap();
        assert_eq!(tx.length as usize, bytes.len());
        assert_eq!(bytes.len(), 37 + 4 + 130 + 4 + 64 + 4 + 74);
        assert_eq!(&bytes[..4], &(bytes.len() as u32).to_le_bytes());
        assert_eq!(bytes[4], 0);
    }

    #[test]
    fn output_fields_are_little_endian() {
        let bytes = sample().serialize().unwrap();
        // first output starts after header, sigs, inputs and the output count
        let start = 37 + 4 + 130 + 4 + 64 + 4;
        assert_eq!(bytes[start], 0);
        assert_eq!(&bytes[start + 1..start + 21], &[0xaa; 20]);
        assert_eq!(&bytes[start + 21..start + 29], &2_000_000u64.to_le_bytes());
        assert_eq!(&bytes[start + 29..start + 37], &45u64.to_le_bytes());
    }

    #[test]
    fn inner_hash_covers_inputs_and_outputs_only() {
        let mut tx = sample();
        let before = tx.hash_inner().unwrap();
        tx.sigs.clear();
        assert_eq!(tx.hash_inner().unwrap(), before);
        tx.outputs[1].hours += 1;
        assert_ne!(tx.hash_inner().unwrap(), before);
    }

    #[test]
    fn decoding_recovers_the_transaction() {
        let tx = sample();
        let decoded = SkyTransaction::deserialize(&tx.serialize().unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn truncated_bytes_are_rejected() {
        let bytes = sample().serialize().unwrap();
        let err = SkyTransaction::deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, GatewayError::SerializationFailure(_)));
    }

    // One input, change to the signer and a payment, signed with the key [1; 32].
    const KNOWN_TX: &str = concat!(
        "dc000000004a405102a42d1d6b43682096915f9372c401982b694e9f0fbbef18138860a2b3",
        "01000000f05dd1dfbf469c0a2510de489909af36edf5008c79150f9000b12751221f5030",
        "278bb431c34755cfa399e1c006b48ec20a57a33c09707936ca50b39d86ae89a601",
        "010000003070182bbe5b6d486d850588287983a89170113ccfad96932f43647a97f3825a",
        "0200000000d7dc1fd8434d71032741ff31d862b59db9d4e507",
        "80841e0000000000",
        "4800000000000000",
        "008ec593df9359f965a44e1ae72c211dc8f319c071",
        "808d5b0000000000",
        "0800000000000000",
    );
    const KNOWN_TXID: &str = "1eeef24c8e76e520e8da31cecba41500eb0986045c48be836237b5cc8da012b7";

    #[test]
    fn known_transaction_reencodes_byte_for_byte() {
        let bytes = hex::decode(KNOWN_TX).unwrap();
        let tx = SkyTransaction::deserialize(&bytes).unwrap();

        assert_eq!(tx.length, 220);
        assert_eq!(tx.tx_type, 0);
        assert_eq!(tx.sigs.len(), 1);
        assert_eq!(
            hex::encode(tx.inputs[0]),
            "3070182bbe5b6d486d850588287983a89170113ccfad96932f43647a97f3825a"
        );
        assert_eq!(tx.outputs[0].address.to_string(), "2VrjbWASwA7bAH2Ji4r6C9vFhcgyTpdWo9Q");
        assert_eq!((tx.outputs[0].coins, tx.outputs[0].hours), (2_000_000, 72));
        assert_eq!(tx.outputs[1].address.to_string(), "zT1M5dY8QwYVu1JVv77XW82tLWhdsnztEQ");
        assert_eq!((tx.outputs[1].coins, tx.outputs[1].hours), (6_000_000, 8));

        assert_eq!(tx.hash_inner().unwrap(), tx.inner_hash);
        assert_eq!(tx.serialize().unwrap(), bytes);
        assert_eq!(tx.txid().unwrap(), KNOWN_TXID);
    }

    #[test]
    fn txid_is_stable() {
        assert_eq!(sample().txid().unwrap(), sample().txid().unwrap());
        assert_eq!(sample().txid().unwrap().len(), 64);
    }
}
