//! Deterministic (CREATE2) address derivation.
//!
//! Results must equal the chain's own CREATE2 computation bit-for-bit: forwarders sign
//! transactions for proxies that do not exist yet and must land at exactly this address.

use alloy_primitives::{Address, B256};

use crate::encoding::keccak256_bytes;

const MINIMAL_PROXY_PREFIX: [u8; 20] = [
    0x3d, 0x60, 0x2d, 0x80, 0x60, 0x0a, 0x3d, 0x39, 0x81, 0xf3, // creation
    0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d, 0x3d, 0x36, 0x3d, 0x73, // runtime up to PUSH20
];
const MINIMAL_PROXY_SUFFIX: [u8; 15] = [
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

/// `last20(keccak256(0xff ++ deployer ++ salt ++ init_code_hash))`.
pub fn compute_deployed_address(deployer: Address, init_code_hash: B256, salt: B256) -> Address {
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(deployer.as_slice());
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(init_code_hash.as_slice());
    let hash = keccak256_bytes(&buf);
    Address::from_slice(&hash[12..32])
}

/// Same as [`compute_deployed_address`] with the init code hashed here.
pub fn compute_deployed_address_from_code(deployer: Address, init_code: &[u8], salt: B256) -> Address {
    compute_deployed_address(deployer, keccak256_bytes(init_code), salt)
}

/// EIP-1167 creation code for a minimal proxy delegating to `implementation`.
pub fn minimal_proxy_init_code(implementation: Address) -> Vec<u8> {
    let mut code = Vec::with_capacity(55);
    code.extend_from_slice(&MINIMAL_PROXY_PREFIX);
    code.extend_from_slice(implementation.as_slice());
    code.extend_from_slice(&MINIMAL_PROXY_SUFFIX);
    code
}

/// Salt the proxy factory uses for a signer: `keccak256(abi.encode(signer))`.
pub fn proxy_salt(signer: Address) -> B256 {
    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(signer.as_slice());
    keccak256_bytes(&padded)
}

/// Address of the per-signer proxy the factory deploys in front of `base_account`.
pub fn compute_proxy_address(factory: Address, signer: Address, base_account: Address) -> Address {
    let init_code = minimal_proxy_init_code(base_account);
    compute_deployed_address_from_code(factory, &init_code, proxy_salt(signer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    // EIP-1014 reference vectors.
    #[test]
    fn eip1014_zero_deployer() {
        let got = compute_deployed_address_from_code(Address::ZERO, &[0x00], B256::ZERO);
        assert_eq!(got, address!("4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38"));
    }

    #[test]
    fn eip1014_deadbeef_deployer() {
        let deployer = address!("deadbeef00000000000000000000000000000000");
        let got = compute_deployed_address_from_code(deployer, &[0x00], B256::ZERO);
        assert_eq!(got, address!("B928f69Bb1D91Cd65274e3c79d8986362984fDA3"));

        let salt = b256!("000000000000000000000000feed000000000000000000000000000000000000");
        let got = compute_deployed_address_from_code(deployer, &[0x00], salt);
        assert_eq!(got, address!("D04116cDd17beBE565EB2422F2497E06cC1C9833"));
    }

    #[test]
    fn eip1014_empty_init_code() {
        let got = compute_deployed_address_from_code(Address::ZERO, &[], B256::ZERO);
        assert_eq!(got, address!("E33C0C7F7df4809055C3ebA6c09CFe4BaF1BD9e0"));
    }

    #[test]
    fn matches_alloy_create2() {
        let deployer = address!("00000000000000000000000000000000deadbeef");
        let init_code = minimal_proxy_init_code(Address::repeat_byte(0x42));
        let salt = proxy_salt(Address::repeat_byte(0x07));
        assert_eq!(
            compute_deployed_address_from_code(deployer, &init_code, salt),
            deployer.create2_from_code(salt.0, &init_code)
        );
    }

    #[test]
    fn minimal_proxy_embeds_implementation() {
        let implementation = Address::repeat_byte(0xbe);
        let code = minimal_proxy_init_code(implementation);
        assert_eq!(code.len(), 55);
        assert_eq!(&code[20..40], implementation.as_slice());
    }

    #[test]
    fn proxy_address_is_deterministic_and_signer_scoped() {
        let factory = Address::repeat_byte(0x0f);
        let base = Address::repeat_byte(0xba);
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let first = compute_proxy_address(factory, alice, base);
        assert_eq!(first, compute_proxy_address(factory, alice, base));
        assert_eq!(first.as_slice().len(), 20);
        assert_ne!(first, compute_proxy_address(factory, bob, base));
        assert_ne!(first, compute_proxy_address(factory, alice, Address::repeat_byte(0xbb)));
    }
}
