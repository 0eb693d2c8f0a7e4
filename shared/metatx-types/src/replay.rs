use alloy_primitives::{address, Address, Bytes, U256};

/// Authority id telling the verifier to use its built-in queue (multi-nonce) checker.
pub const MULTI_NONCE_AUTHORITY: Address = Address::ZERO;

/// Authority id telling the verifier to use its built-in bitmap (bit-flip) checker.
pub const BIT_FLIP_AUTHORITY: Address = address!("0000000000000000000000000000000000000001");

/// Replay-protection token as checked by the verifier.
///
/// Queue scheme: `(queue, nonce)`. Bitmap scheme: `(bitmap index, single-bit mask)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReplayToken {
    pub index: U256,
    pub nonce: U256,
}

impl ReplayToken {
    pub const ENCODED_LEN: usize = 64;

    pub fn new(index: U256, nonce: U256) -> Self {
        Self { index, nonce }
    }

    /// `abi.encode(uint256 index, uint256 nonce)`; both words are static so the
    /// encoding is the two big-endian words back to back.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.extend_from_slice(&self.index.to_be_bytes::<32>());
        buf.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        Bytes::from(buf)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        Some(Self {
            index: U256::from_be_slice(&bytes[0..32]),
            nonce: U256::from_be_slice(&bytes[32..64]),
        })
    }
}
