use thiserror::Error;

use crate::amount::AmountError;

/// The pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Input,
    Fetch,
    Select,
    Build,
    Sign,
    Serialize,
    Submit,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{coin_type} is not supported")]
    UnsupportedCoinType { coin_type: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("malformed input: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("no private key supplied for input address {address}")]
    MissingKey { address: String },

    /// The node or gateway could not serve a read request.
    #[error("[{coin_type}] node request failed: {reason}")]
    OutputSourceUnavailable { coin_type: String, reason: String },

    #[error("transaction rejected by node: {reason}")]
    SubmissionRejected { reason: String },

    #[error("submission of {txid} could not be confirmed: {reason}")]
    SubmissionUnconfirmed { txid: String, reason: String },

    #[error("unbalanced transaction: inputs {inputs}, outputs {outputs}, fee {fee}")]
    Unbalanced { inputs: u64, outputs: u64, fee: u64 },

    #[error("failed to sign input {input_index}: {reason}")]
    Signing { input_index: usize, reason: String },

    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn stage(&self) -> Stage {
        match self {
            GatewayError::UnsupportedCoinType { .. }
            | GatewayError::MalformedInput(_)
            | GatewayError::InvalidAmount(_)
            | GatewayError::Io(_)
            | GatewayError::Json(_) => Stage::Input,
            GatewayError::Config(_) => Stage::Config,
            GatewayError::OutputSourceUnavailable { .. } => Stage::Fetch,
            GatewayError::InsufficientFunds { .. } => Stage::Select,
            GatewayError::Unbalanced { .. } => Stage::Build,
            GatewayError::MissingKey { .. } | GatewayError::Signing { .. } => Stage::Sign,
            GatewayError::SerializationFailure(_) => Stage::Serialize,
            GatewayError::SubmissionRejected { .. }
            | GatewayError::SubmissionUnconfirmed { .. } => Stage::Submit,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        GatewayError::MalformedInput(reason.into())
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_errors_are_input_errors() {
        let err: GatewayError = AmountError::Empty.into();
        assert_eq!(err.stage(), Stage::Input);
        assert!(err.to_string().starts_with("malformed input"));
    }

    #[test]
    fn funds_and_node_failures_are_distinguishable() {
        let funds = GatewayError::InsufficientFunds {
            available: 1,
            required: 2,
        };
        let down = GatewayError::OutputSourceUnavailable {
            coin_type: "skycoin".into(),
            reason: "connection refused".into(),
        };
        let keys = GatewayError::malformed("2 addresses but 1 private keys");
        assert_eq!(funds.stage(), Stage::Select);
        assert_eq!(down.stage(), Stage::Fetch);
        assert_eq!(keys.stage(), Stage::Input);
    }
}
