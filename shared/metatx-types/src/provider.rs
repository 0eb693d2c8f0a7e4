use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by the chain collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Transport-level failure; the caller may retry.
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// The verifier rejected a submission because its replay token was already used.
    #[error("verifier rejected replay protection: {0}")]
    ReplayRejected(String),
    /// The provider does not implement this operation.
    #[error("operation not supported by provider: {0}")]
    Unsupported(&'static str),
}

/// Chain access the meta-transaction client depends on but does not implement.
///
/// Implemented over a real RPC connection by the caller, and by an in-memory mock in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Deployed code at `address` (empty when nothing is deployed yet).
    async fn code_at(&self, address: Address) -> Result<Bytes, ProviderError>;

    /// `nonceStore(bytes32)` on `store`.
    async fn nonce_store(&self, store: Address, key: B256) -> Result<U256, ProviderError>;

    /// Submit raw calldata to `to`, returning the transaction hash.
    async fn send_transaction(&self, _to: Address, _data: Bytes) -> Result<B256, ProviderError> {
        Err(ProviderError::Unsupported("send_transaction"))
    }
}
