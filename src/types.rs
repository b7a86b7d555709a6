use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{GatewayError, Result};

/// Locates an unspent output on-chain. Skycoin-family outputs are named by
/// their hash alone and always carry `index == 0`; bitcoin outputs are a
/// txid/vout pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OutputId {
    pub hash: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnspentOutput {
    pub id: OutputId,
    pub address: String,
    /// Smallest-unit value (droplets or satoshis).
    pub coins: u64,
    /// Secondary weight (coin hours). Always 0 for bitcoin.
    pub hours: u64,
}

/// Secret keys supplied for one request, keyed by the address they own.
#[derive(Clone, Default)]
pub struct AddressKeySet {
    keys: BTreeMap<String, String>,
}

impl AddressKeySet {
    /// Pairs parallel comma separated address and key lists.
    pub fn from_csv(addresses: &str, private_keys: &str) -> Result<Self> {
        let addrs: Vec<&str> = addresses.split(',').map(str::trim).collect();
        let keys: Vec<&str> = private_keys.split(',').map(str::trim).collect();

        if addrs.len() != keys.len() {
            return Err(GatewayError::malformed(format!(
                "private keys not match addresses: {} addresses but {} private keys",
                addrs.len(),
                keys.len()
            )));
        }

        let mut set = AddressKeySet::default();
        for (index, (addr, key)) in addrs.into_iter().zip(keys).enumerate() {
            if addr.is_empty() || key.is_empty() {
                return Err(GatewayError::malformed(format!(
                    "empty address or private key at position {index}"
                )));
            }
            set.insert(addr, key)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, address: &str, secret: &str) -> Result<()> {
        match self.keys.get(address) {
            Some(existing) if existing != secret => Err(GatewayError::malformed(format!(
                "address {address} is listed twice with different private keys"
            ))),
            _ => {
                self.keys.insert(address.to_string(), secret.to_string());
                Ok(())
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&str> {
        self.keys.get(address).map(String::as_str)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// 秘密鍵はデバッグ出力にも含めない
impl std::fmt::Debug for AddressKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressKeySet")
            .field("addresses", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The outputs chosen for one spend and the value they leave over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    pub chosen: Vec<UnspentOutput>,
    pub total_coins: u64,
    pub total_hours: u64,
    pub amount: u64,
    pub fee: u64,
    pub change: u64,
}

impl SpendPlan {
    pub fn new(chosen: Vec<UnspentOutput>, amount: u64, fee: u64) -> Result<Self> {
        let total_coins = chosen
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.coins))
            .ok_or_else(|| GatewayError::malformed("total coins of chosen outputs overflows"))?;
        let total_hours = chosen.iter().fold(0u64, |acc, o| acc.saturating_add(o.hours));
        let required = amount
            .checked_add(fee)
            .ok_or_else(|| GatewayError::malformed("amount plus fee overflows"))?;

        if total_coins < required {
            return Err(GatewayError::InsufficientFunds {
                available: total_coins,
                required,
            });
        }

        Ok(SpendPlan {
            chosen,
            total_coins,
            total_hours,
            amount,
            fee,
            change: total_coins - required,
        })
    }

    /// Change goes back to the address of the first chosen output.
    pub fn change_address(&self) -> Option<&str> {
        self.chosen.first().map(|o| o.address.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutput {
    pub address: String,
    pub coins: u64,
    pub hours: u64,
}

/// Inputs and outputs in signing order, before any signature exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub inputs: Vec<UnspentOutput>,
    pub outputs: Vec<DraftOutput>,
}

impl TransactionDraft {
    pub fn input_coins(&self) -> u64 {
        self.inputs.iter().map(|i| i.coins).sum()
    }

    pub fn output_coins(&self) -> u64 {
        self.outputs.iter().map(|o| o.coins).sum()
    }

    pub fn output_hours(&self) -> u64 {
        self.outputs.iter().map(|o| o.hours).sum()
    }
}

/// A signed, serialized transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(rename = "rawtx")]
    pub hex: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub coins: u64,
    pub hours: u64,
}

impl Balance {
    pub fn of(outputs: &[UnspentOutput]) -> Self {
        outputs.iter().fold(Balance::default(), |acc, o| Balance {
            coins: acc.coins.saturating_add(o.coins),
            hours: acc.hours.saturating_add(o.hours),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ux(hash: &str, address: &str, coins: u64) -> UnspentOutput {
        UnspentOutput {
            id: OutputId {
                hash: hash.into(),
                index: 0,
            },
            address: address.into(),
            coins,
            hours: 10,
        }
    }

    #[test]
    fn key_lists_must_have_equal_length() {
        let err = AddressKeySet::from_csv("a,b", "k1").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedInput(_)));
        assert!(err.to_string().contains("2 addresses but 1 private keys"));
    }

    #[test]
    fn key_lists_are_trimmed_and_paired() {
        let set = AddressKeySet::from_csv("a, b", "k1 ,k2").unwrap();
        assert_eq!(set.get("a"), Some("k1"));
        assert_eq!(set.get("b"), Some("k2"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn conflicting_duplicate_address_is_rejected() {
        assert!(AddressKeySet::from_csv("a,a", "k1,k2").is_err());
        assert_eq!(AddressKeySet::from_csv("a,a", "k1,k1").unwrap().len(), 1);
        assert!(AddressKeySet::from_csv("a,", "k1,k2").is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let set = AddressKeySet::from_csv("addr", "deadbeef").unwrap();
        let printed = format!("{set:?}");
        assert!(printed.contains("addr"));
        assert!(!printed.contains("deadbeef"));
    }

    #[test]
    fn plan_computes_change_and_change_address() {
        let plan = SpendPlan::new(vec![ux("h1", "a", 3), ux("h2", "b", 5)], 6, 1).unwrap();
        assert_eq!(plan.total_coins, 8);
        assert_eq!(plan.total_hours, 20);
        assert_eq!(plan.change, 1);
        assert_eq!(plan.change_address(), Some("a"));
    }

    #[test]
    fn plan_refuses_to_overspend() {
        let err = SpendPlan::new(vec![ux("h1", "a", 3)], 3, 1).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InsufficientFunds {
                available: 3,
                required: 4
            }
        ));
    }
}
