//! Signing engine of a multi-coin gateway: selects unspent outputs, splits
//! coin hours, builds and signs transactions offline, and hands them to a
//! node for injection.

pub mod amount;
pub mod btc;
pub mod config;
pub mod engine;
pub mod error;
pub mod hours;
pub mod keys;
pub mod node;
pub mod selection;
pub mod skycoin;
pub mod transaction;
pub mod types;

pub use config::{CoinFamily, CoinMeta, CoinRegistry, GatewayConfig};
pub use engine::{Engine, SendRequest};
pub use error::{GatewayError, Result, Stage};
pub use node::{HttpNode, OutputSource, SubmitError, TransactionSubmitter};
pub use types::{AddressKeySet, Balance, OutputId, RawTransaction, UnspentOutput};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
