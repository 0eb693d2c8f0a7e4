use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolValue;
use metatx_types::ReplayToken;
use rand::Rng;
use tracing::debug;

use super::NonceSource;
use crate::encoding::keccak256_bytes;
use crate::error::{MetaTxError, Result};

/// Bitmap index advances allowed per allocation before giving up.
pub const MAX_BITMAP_ADVANCES: u32 = 30;

/// Bitmap indexes below this bound are left to multi-nonce queues, which share the
/// verifier's nonce store. Random starting indexes are drawn from
/// `[BITMAP_RESERVED_INDEXES, 2^64)`.
pub const BITMAP_RESERVED_INDEXES: u64 = 1 << 32;

/// Nonce-store key of a signer's bitmap: `keccak256(abi.encode(signer, index))`.
pub fn bitmap_key(signer: Address, index: U256) -> B256 {
    keccak256_bytes(&(signer, index).abi_encode_params())
}

/// Lowest unset bit of `bitmap`, or `None` when all 256 bits are set.
pub fn find_empty_bit(bitmap: U256) -> Option<u32> {
    if bitmap == U256::MAX {
        return None;
    }
    Some((!bitmap).trailing_zeros() as u32)
}

/// Add `2^bit` to `bitmap`.
///
/// This is arithmetic, not a bitwise OR: flipping an already set bit carries into the next
/// one. Only flip bits [`find_empty_bit`] reported as unset.
pub fn flip_bit(bitmap: U256, bit: u32) -> U256 {
    bitmap.wrapping_add(U256::from(1u64) << (bit as usize))
}

pub fn random_start_index() -> U256 {
    U256::from(rand::thread_rng().gen_range(BITMAP_RESERVED_INDEXES..u64::MAX))
}

/// Unordered one-shot bits.
#[derive(Debug)]
pub struct BitFlip {
    start_index: Option<U256>,
    current: Option<(U256, U256)>,
}

impl BitFlip {
    pub fn new(start_index: Option<U256>) -> Self {
        Self {
            start_index,
            current: None,
        }
    }

    /// `(index, bitmap)` as currently cached.
    #[cfg(test)]
    fn cached(&self) -> Option<(U256, U256)> {
        self.current
    }

    pub async fn allocate(&mut self, signer: Address, source: &NonceSource<'_>) -> Result<ReplayToken> {
        let (mut index, mut bitmap) = match self.current {
            Some(current) => current,
            None => {
                let index = self.start_index.unwrap_or_else(random_start_index);
                (index, source.read(bitmap_key(signer, index)).await?)
            }
        };

        let mut advances = 0;
        loop {
            if let Some(bit) = find_empty_bit(bitmap) {
                self.current = Some((index, flip_bit(bitmap, bit)));
                return Ok(ReplayToken::new(index, U256::from(1u64) << (bit as usize)));
            }
            if advances == MAX_BITMAP_ADVANCES {
                return Err(MetaTxError::ReplayAllocationExhausted {
                    advances,
                    last_index: index,
                });
            }
            advances += 1;
            index += U256::from(1u64);
            debug!(
                target: "metatx::replay",
                signer = %signer,
                %index,
                "bitmap full, advancing"
            );
            bitmap = source.read(bitmap_key(signer, index)).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;
    use crate::retry::RetryPolicy;

    const SIGNER: Address = Address::ZERO;
    const STORE: Address = Address::ZERO;

    #[test]
    fn empty_bit_search() {
        assert_eq!(find_empty_bit(U256::ZERO), Some(0));
        assert_eq!(find_empty_bit(U256::from(1u64)), Some(1));
        assert_eq!(find_empty_bit(U256::from(0b1011u64)), Some(2));
        assert_eq!(find_empty_bit(U256::MAX >> 1), Some(255));
        assert_eq!(find_empty_bit(U256::MAX), None);
        // Lowest gap wins even with higher bits set.
        assert_eq!(find_empty_bit(U256::MAX - U256::from(1u64 << 17)), Some(17));
    }

    #[test]
    fn flip_is_not_idempotent() {
        for i in [0u32, 1, 7, 128, 254, 255] {
            let once = flip_bit(U256::ZERO, i);
            assert_eq!(once, U256::from(1u64) << (i as usize));
            assert_ne!(flip_bit(once, i), once);
        }
    }

    #[test]
    fn random_start_avoids_reserved_band() {
        for _ in 0..100 {
            let index = random_start_index();
            assert!(index >= U256::from(BITMAP_RESERVED_INDEXES));
            assert!(index < U256::from(u64::MAX));
        }
    }

    #[tokio::test]
    async fn advances_after_256_allocations() {
        let chain = MockChain::new();
        let retry = RetryPolicy::immediate(1);
        let source = NonceSource::new(&chain, &retry, STORE);
        let start = U256::from(1_000u64);
        let mut bitmaps = BitFlip::new(Some(start));

        for bit in 0..256usize {
            let token = bitmaps.allocate(SIGNER, &source).await.unwrap();
            assert_eq!(token.index, start);
            assert_eq!(token.nonce, U256::from(1u64) << bit);
        }
        let token = bitmaps.allocate(SIGNER, &source).await.unwrap();
        assert_eq!(token.index, start + U256::from(1u64));
        assert_eq!(token.nonce, U256::from(1u64));
    }

    #[tokio::test]
    async fn skips_bits_already_used_on_chain() {
        let chain = MockChain::new();
        let store = Address::repeat_byte(0x0d);
        chain.deploy(store);
        let start = U256::from(77u64);
        chain.set_nonce(store, bitmap_key(SIGNER, start), U256::from(0b0111u64));

        let retry = RetryPolicy::immediate(1);
        let source = NonceSource::new(&chain, &retry, store);
        let mut bitmaps = BitFlip::new(Some(start));
        let token = bitmaps.allocate(SIGNER, &source).await.unwrap();
        assert_eq!(token.nonce, U256::from(0b1000u64));
        assert_eq!(bitmaps.cached(), Some((start, U256::from(0b1111u64))));
    }

    #[tokio::test]
    async fn exhausts_when_every_bitmap_is_full() {
        let chain = MockChain::new();
        let store = Address::repeat_byte(0x0d);
        chain.deploy(store);
        let start = U256::from(5u64);
        for offset in 0..=MAX_BITMAP_ADVANCES as u64 {
            chain.set_nonce(store, bitmap_key(SIGNER, start + U256::from(offset)), U256::MAX);
        }

        let retry = RetryPolicy::immediate(1);
        let source = NonceSource::new(&chain, &retry, store);
        let mut bitmaps = BitFlip::new(Some(start));
        let err = bitmaps.allocate(SIGNER, &source).await.unwrap_err();
        match err {
            MetaTxError::ReplayAllocationExhausted { advances, last_index } => {
                assert_eq!(advances, MAX_BITMAP_ADVANCES);
                assert_eq!(last_index, start + U256::from(MAX_BITMAP_ADVANCES));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(bitmaps.cached().is_none());
    }

    #[tokio::test]
    async fn finds_space_within_advance_budget() {
        let chain = MockChain::new();
        let store = Address::repeat_byte(0x0d);
        chain.deploy(store);
        let start = U256::from(5u64);
        for offset in 0..MAX_BITMAP_ADVANCES as u64 {
            chain.set_nonce(store, bitmap_key(SIGNER, start + U256::from(offset)), U256::MAX);
        }

        let retry = RetryPolicy::immediate(1);
        let source = NonceSource::new(&chain, &retry, store);
        let mut bitmaps = BitFlip::new(Some(start));
        let token = bitmaps.allocate(SIGNER, &source).await.unwrap();
        assert_eq!(token.index, start + U256::from(MAX_BITMAP_ADVANCES));
        assert_eq!(token.nonce, U256::from(1u64));
    }
}
