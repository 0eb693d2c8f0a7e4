//! In-memory chain for tests and offline use.
//!
//! Stands in for an RPC-backed [`ChainClient`] so allocation, signing and encoding can be
//! exercised without a node.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use metatx_types::{ChainClient, ProviderError};

use crate::encoding::keccak256_bytes;

#[derive(Default)]
struct MockState {
    code: HashMap<Address, Bytes>,
    nonces: HashMap<(Address, B256), U256>,
    failing_reads: u32,
    nonce_reads: u32,
    reject_next: Option<String>,
    submissions: Vec<(Address, Bytes)>,
}

/// Mock chain provider.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `address` as having code.
    pub fn deploy(&self, address: Address) {
        self.state()
            .code
            .insert(address, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]));
    }

    pub fn set_nonce(&self, store: Address, key: B256, value: U256) {
        self.state().nonces.insert((store, key), value);
    }

    /// Fail the next `count` reads with a transient error.
    pub fn fail_next_reads(&self, count: u32) {
        self.state().failing_reads = count;
    }

    /// Reject the next submission as a replay.
    pub fn reject_next_submission(&self, reason: impl Into<String>) {
        self.state().reject_next = Some(reason.into());
    }

    /// Number of successful `nonce_store` reads so far.
    pub fn nonce_reads(&self) -> u32 {
        self.state().nonce_reads
    }

    pub fn submissions(&self) -> Vec<(Address, Bytes)> {
        self.state().submissions.clone()
    }

    fn take_failure(state: &mut MockState) -> Result<(), ProviderError> {
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ProviderError::Transient("mock: connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn code_at(&self, address: Address) -> Result<Bytes, ProviderError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn nonce_store(&self, store: Address, key: B256) -> Result<U256, ProviderError> {
        let mut state = self.state();
        Self::take_failure(&mut state)?;
        state.nonce_reads += 1;
        Ok(state.nonces.get(&(store, key)).copied().unwrap_or_default())
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<B256, ProviderError> {
        let mut state = self.state();
        if let Some(reason) = state.reject_next.take() {
            return Err(ProviderError::ReplayRejected(reason));
        }
        let mut preimage = Vec::with_capacity(20 + data.len() + 8);
        preimage.extend_from_slice(to.as_slice());
        preimage.extend_from_slice(&data);
        preimage.extend_from_slice(&(state.submissions.len() as u64).to_be_bytes());
        state.submissions.push((to, data));
        Ok(keccak256_bytes(&preimage))
    }
}
