//! Signing collaborator and secp256k1 helpers.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::encoding::keccak256_bytes;
use crate::error::{MetaTxError, Result};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// Abstraction for an entity that can sign 32-byte digests.
///
/// Implemented by [`LocalSigner`] for keys held in process, and by callers for remote
/// signers (KMS, hardware wallets).
#[async_trait]
pub trait MetaSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign `hash` as-is (no further hashing or prefixing), returning `r || s || v` with
    /// `v` in {27, 28}.
    async fn sign_hash(&self, hash: B256) -> Result<Bytes>;
}

/// Signer over a private key held in memory.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn from_slice(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| MetaTxError::Signer(format!("invalid private key: {e}")))?;
        Ok(Self::from_signing_key(key))
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let secret = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(secret)
            .map_err(|e| MetaTxError::Signer(format!("invalid private key hex: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Synchronous signing; the async trait method delegates here.
    pub fn sign_hash_sync(&self, hash: B256) -> Result<Bytes> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| MetaTxError::Signer(e.to_string()))?;

        let mut sig_bytes = Vec::with_capacity(SIGNATURE_LEN);
        sig_bytes.extend_from_slice(&signature.to_bytes());
        sig_bytes.push(27 + recovery_id.to_byte());
        Ok(Bytes::from(sig_bytes))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MetaSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, hash: B256) -> Result<Bytes> {
        self.sign_hash_sync(hash)
    }
}

/// Ethereum address of a public key: last 20 bytes of `keccak256(x || y)`.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256_bytes(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..32])
}

/// Recover the address that produced `signature` over `hash`.
///
/// Accepts `v` in {0, 1, 27, 28}.
pub fn recover_signer(hash: B256, signature: &[u8]) -> Result<Address> {
    if signature.len() != SIGNATURE_LEN {
        return Err(MetaTxError::Signer(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let v = match signature[64] {
        27 | 28 => signature[64] - 27,
        0 | 1 => signature[64],
        other => return Err(MetaTxError::Signer(format!("unsupported recovery byte {other}"))),
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| MetaTxError::Signer(format!("invalid recovery id {v}")))?;
    let signature = Signature::from_slice(&signature[..64])
        .map_err(|e| MetaTxError::Signer(format!("malformed signature: {e}")))?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
        .map_err(|e| MetaTxError::Signer(format!("signature recovery failed: {e}")))?;
    Ok(address_of(&key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn known_key_address() {
        let signer = LocalSigner::from_hex(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            signer.address(),
            address!("2c7536E3605D9C16a7a3D7b1898e529396a65c23")
        );
    }

    #[test]
    fn key_one_address() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let signer = LocalSigner::from_slice(&secret).unwrap();
        assert_eq!(
            signer.address(),
            address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf")
        );
    }

    #[test]
    fn sign_then_recover() {
        let signer = LocalSigner::random();
        let hash = keccak256_bytes(b"meta-transaction");
        let sig = signer.sign_hash_sync(hash).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(sig[64] == 27 || sig[64] == 28);
        assert_eq!(recover_signer(hash, &sig).unwrap(), signer.address());

        let mut normalized = sig.to_vec();
        normalized[64] -= 27;
        assert_eq!(recover_signer(hash, &normalized).unwrap(), signer.address());
    }

    #[test]
    fn recover_rejects_bad_input() {
        let hash = keccak256_bytes(b"x");
        assert!(recover_signer(hash, &[0u8; 64]).is_err());
        let mut sig = [1u8; 65];
        sig[64] = 30;
        assert!(recover_signer(hash, &sig).is_err());
    }

    #[test]
    fn zero_key_rejected() {
        assert!(matches!(
            LocalSigner::from_slice(&[0u8; 32]),
            Err(MetaTxError::Signer(_))
        ));
    }
}
