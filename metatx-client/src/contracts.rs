//! Solidity ABI of the verifier contracts this client produces calldata for.
//!
//! Field order and types must match the deployed verifiers exactly; the verifier
//! recomputes the signed payload from these arguments.

use alloy_sol_types::sol;

sol! {
    /// Shared singleton verifier; emulates `msg.sender` for the signer.
    interface IRelayHub {
        function forward(
            address target,
            bytes callData,
            bytes replayProtection,
            address replayProtectionAuthority,
            address signer,
            bytes signature
        ) external;

        function deployContract(
            bytes initCode,
            bytes replayProtection,
            address replayProtectionAuthority,
            address signer,
            bytes signature
        ) external returns (address);
    }

    /// Per-signer proxy account deployed behind a minimal proxy.
    interface IProxyAccount {
        function forward(
            address target,
            uint256 value,
            bytes callData,
            bytes replayProtection,
            address replayProtectionAuthority,
            bytes signature
        ) external returns (bytes);

        function delegate(
            address target,
            bytes callData,
            bytes replayProtection,
            address replayProtectionAuthority,
            bytes signature
        ) external returns (bytes);

        function deployContract(
            bytes initCode,
            bytes replayProtection,
            address replayProtectionAuthority,
            bytes signature
        ) external returns (address);
    }

    /// Per-signer smart wallet verifying EIP-712 typed transactions.
    interface ISmartWallet {
        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            bytes replayProtection,
            address replayProtectionAuthority,
            bytes signature
        ) external payable returns (bool);
    }

    /// CREATE2 factory for proxy accounts and smart wallets.
    interface IProxyAccountDeployer {
        function createProxyAccount(address signer) external returns (address);
    }

    /// Batch executor, reached through delegatecall.
    interface IMultiSend {
        function batch(address[] targets, bytes[] data, bool[] revertIfFail) external;
    }

    /// CREATE2 helper library used by smart wallets for meta-deployments.
    interface ICreate2Deployer {
        function deploy(bytes initCode, bytes32 salt) external returns (address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;

    #[test]
    fn batch_signature() {
        assert_eq!(
            IMultiSend::batchCall::SIGNATURE,
            "batch(address[],bytes[],bool[])"
        );
    }
}
