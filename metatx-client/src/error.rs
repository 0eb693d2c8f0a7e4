use alloy_primitives::U256;
use metatx_types::ProviderError;
use thiserror::Error;

/// Errors surfaced by meta-transaction construction and replay protection.
#[derive(Debug, Error)]
pub enum MetaTxError {
    /// Unknown chain/variant combination or incomplete configuration. Raised before any
    /// network access.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The bitmap scheme advanced through its whole index budget without finding a free bit.
    #[error("no free replay-protection bit after {advances} bitmap advances (last index {last_index})")]
    ReplayAllocationExhausted { advances: u32, last_index: U256 },

    /// A chain read kept failing after the retry budget.
    #[error("provider unavailable after {attempts} attempts during {operation}: {source}")]
    TransientProvider {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The verifier rejected a token the local cache believed unused. Call
    /// `reset_replay_protection` before signing again.
    #[error("replay-protection cache is stale: {0}")]
    StaleCacheMismatch(String),

    /// The call does not fit the forwarder variant's call-data shape.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The signing collaborator failed or produced an unusable signature.
    #[error("signer error: {0}")]
    Signer(String),
}

/// Result type alias for meta-transaction operations
pub type Result<T> = std::result::Result<T, MetaTxError>;

impl From<alloy_sol_types::Error> for MetaTxError {
    fn from(err: alloy_sol_types::Error) -> Self {
        MetaTxError::Encoding(err.to_string())
    }
}
