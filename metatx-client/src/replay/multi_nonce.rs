use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolValue;
use metatx_types::ReplayToken;

use super::NonceSource;
use crate::encoding::keccak256_bytes;
use crate::error::Result;

/// Nonce-store key of a signer's queue: `keccak256(abi.encode(signer, queue))`.
pub fn queue_key(signer: Address, queue: u32) -> B256 {
    keccak256_bytes(&(signer, U256::from(queue)).abi_encode_params())
}

/// Round-robin ordered queues.
///
/// With one queue, every transaction replaces or follows the previous one strictly in
/// order. With `N` queues, up to `N` transactions can be in flight and land in any order
/// relative to each other.
#[derive(Debug)]
pub struct MultiNonce {
    concurrency: u32,
    last_queue: u32,
    next_nonce: HashMap<u32, U256>,
}

impl MultiNonce {
    /// `concurrency` must be non-zero; the authority validates it.
    pub fn new(concurrency: u32) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            concurrency,
            last_queue: concurrency - 1,
            next_nonce: HashMap::new(),
        }
    }

    /// Next nonce cached for `queue`, if the queue has been seeded.
    #[cfg(test)]
    fn cached(&self, queue: u32) -> Option<U256> {
        self.next_nonce.get(&queue).copied()
    }

    pub async fn allocate(&mut self, signer: Address, source: &NonceSource<'_>) -> Result<ReplayToken> {
        let queue = (self.last_queue + 1) % self.concurrency;
        let nonce = match self.next_nonce.get(&queue) {
            Some(nonce) => *nonce,
            None => source.read(queue_key(signer, queue)).await?,
        };

        // Commit only once the seed read succeeded.
        self.next_nonce.insert(queue, nonce + U256::from(1u64));
        self.last_queue = queue;
        Ok(ReplayToken::new(U256::from(queue), nonce))
    }
}
