//! Canonical payload construction and hashing shared by all forwarder variants.

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use alloy_sol_types::SolValue;
use metatx_types::CallKind;
use sha3::{Digest, Keccak256};

pub fn keccak256_bytes(bytes: &[u8]) -> FixedBytes<32> {
    let mut h = Keccak256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut b = [0u8; 32];
    b.copy_from_slice(&out);
    FixedBytes(b)
}

/// `keccak256("\x19Ethereum Signed Message:\n32" || hash)`, the digest verifiers recover against.
pub fn eth_signed_message_hash(hash: B256) -> B256 {
    let mut buf = Vec::with_capacity(28 + 32);
    buf.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    buf.extend_from_slice(hash.as_slice());
    keccak256_bytes(&buf)
}

/// Payload bound by a hub or proxy-account signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningPayload {
    pub call_data: Bytes,
    pub replay_protection: Bytes,
    pub replay_protection_authority: Address,
    pub target: Address,
    pub chain_id: u64,
}

impl SigningPayload {
    /// `abi.encode(bytes, bytes, address, address, uint256)`.
    pub fn encode(&self) -> Vec<u8> {
        (
            self.call_data.clone(),
            self.replay_protection.clone(),
            self.replay_protection_authority,
            self.target,
            U256::from(self.chain_id),
        )
            .abi_encode_params()
    }

    pub fn hash(&self) -> B256 {
        keccak256_bytes(&self.encode())
    }

    /// Digest handed to the signer: the payload hash wrapped as a personal message.
    pub fn signing_hash(&self) -> B256 {
        eth_signed_message_hash(self.hash())
    }
}

/// Hub call data: `abi.encode(address target, bytes data)`.
pub fn encode_hub_call_data(target: Address, data: &Bytes) -> Bytes {
    (target, data.clone()).abi_encode_params().into()
}

/// Proxy-account call data: `abi.encode(address target, uint256 value, bytes data)`.
pub fn encode_proxy_call_data(target: Address, value: U256, data: &Bytes) -> Bytes {
    (target, value, data.clone()).abi_encode_params().into()
}

/// CREATE2 salt for a meta-deployment: `keccak256(abi.encode(signer, replayProtection))`.
pub fn deployment_salt(signer: Address, replay_protection: &Bytes) -> B256 {
    keccak256_bytes(&(signer, replay_protection.clone()).abi_encode_params())
}

/// Typed transaction a smart wallet verifies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: CallKind,
    pub replay_protection: Bytes,
    pub replay_protection_authority: Address,
}

const WALLET_DOMAIN_TYPE: &[u8] = b"EIP712Domain(uint256 chainId,address verifyingContract)";
const WALLET_TRANSACTION_TYPE: &[u8] = b"WalletTransaction(address to,uint256 value,bytes data,uint8 operation,bytes replayProtection,address replayProtectionAuthority)";

fn pad_address(address: Address) -> [u8; 32] {
    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(address.as_slice());
    padded
}

/// EIP-712 domain separator of a smart wallet.
pub fn wallet_domain_separator(chain_id: u64, wallet: Address) -> B256 {
    let mut domain_buf = Vec::with_capacity(32 * 3);
    domain_buf.extend_from_slice(keccak256_bytes(WALLET_DOMAIN_TYPE).as_slice());
    domain_buf.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    domain_buf.extend_from_slice(&pad_address(wallet));
    keccak256_bytes(&domain_buf)
}

impl WalletTransaction {
    pub fn struct_hash(&self) -> B256 {
        let mut struct_buf = Vec::with_capacity(32 * 7);
        struct_buf.extend_from_slice(keccak256_bytes(WALLET_TRANSACTION_TYPE).as_slice());
        struct_buf.extend_from_slice(&pad_address(self.to));
        struct_buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        struct_buf.extend_from_slice(keccak256_bytes(&self.data).as_slice());
        let mut operation_padded = [0u8; 32];
        operation_padded[31] = self.operation as u8;
        struct_buf.extend_from_slice(&operation_padded);
        struct_buf.extend_from_slice(keccak256_bytes(&self.replay_protection).as_slice());
        struct_buf.extend_from_slice(&pad_address(self.replay_protection_authority));
        keccak256_bytes(&struct_buf)
    }

    /// `keccak256("\x19\x01" || domainSeparator || structHash)`, signed without a prefix.
    pub fn digest(&self, chain_id: u64, wallet: Address) -> B256 {
        let mut final_buf = Vec::with_capacity(2 + 32 + 32);
        final_buf.extend_from_slice(b"\x19\x01");
        final_buf.extend_from_slice(wallet_domain_separator(chain_id, wallet).as_slice());
        final_buf.extend_from_slice(self.struct_hash().as_slice());
        keccak256_bytes(&final_buf)
    }
}
