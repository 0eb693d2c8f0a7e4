use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use metatx_types::{CallKind, MetaCall};

use super::{DeploymentParams, ForwardParams, ForwarderCore, ReplayBinding};
use crate::config::ChainAddresses;
use crate::contracts::{ICreate2Deployer, ISmartWallet};
use crate::encoding::{deployment_salt, WalletTransaction};
use crate::error::Result;

/// Forwarder for a per-signer smart wallet.
///
/// The wallet verifies an EIP-712 `WalletTransaction` over its own domain instead of the
/// personal-message payload used by the hub and proxy accounts. Meta-deployments are a
/// delegatecall into the CREATE2 deployer library, so the new contract is created by the
/// wallet itself.
pub struct SmartWalletForwarder {
    pub(super) core: ForwarderCore,
    pub(super) factory: Address,
    pub(super) singleton: Address,
    pub(super) address: Address,
    create2_deployer: Option<Address>,
}

impl SmartWalletForwarder {
    pub(super) fn new(
        core: ForwarderCore,
        factory: Address,
        singleton: Address,
        address: Address,
        create2_deployer: Option<Address>,
    ) -> Self {
        Self {
            core,
            factory,
            singleton,
            address,
            create2_deployer,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub(super) fn call_digest(&self, call: &MetaCall, replay: &ReplayBinding<'_>) -> B256 {
        WalletTransaction {
            to: call.target,
            value: call.value,
            data: call.data.clone(),
            operation: call.kind,
            replay_protection: replay.token.clone(),
            replay_protection_authority: replay.authority,
        }
        .digest(self.core.chain_id, self.address)
    }

    /// Delegatecall the wallet performs to deploy `init_code`.
    pub(super) fn deployment_call(&self, init_code: &Bytes, replay_protection: &Bytes) -> Result<MetaCall> {
        let deployer = ChainAddresses::require(
            self.create2_deployer,
            "create2 deployer",
            self.core.chain_id,
        )?;
        let salt = deployment_salt(self.core.signer.address(), replay_protection);
        let data = ICreate2Deployer::deployCall {
            initCode: init_code.clone(),
            salt,
        }
        .abi_encode();
        Ok(MetaCall {
            target: deployer,
            value: U256::ZERO,
            data: data.into(),
            kind: CallKind::DelegateCall,
        })
    }

    pub(super) fn deployment_digest(&self, init_code: &Bytes, replay: &ReplayBinding<'_>) -> Result<B256> {
        let call = self.deployment_call(init_code, replay.token)?;
        Ok(self.call_digest(&call, replay))
    }

    fn exec(call: &MetaCall, replay_protection: &Bytes, authority: Address, signature: &Bytes) -> Bytes {
        ISmartWallet::execTransactionCall {
            to: call.target,
            value: call.value,
            data: call.data.clone(),
            operation: call.kind as u8,
            replayProtection: replay_protection.clone(),
            replayProtectionAuthority: authority,
            signature: signature.clone(),
        }
        .abi_encode()
        .into()
    }

    pub(super) fn encode_call(&self, params: &ForwardParams) -> Bytes {
        Self::exec(
            &params.call(),
            &params.replay_protection,
            params.replay_protection_authority,
            &params.signature,
        )
    }

    pub(super) fn encode_deployment(&self, params: &DeploymentParams) -> Result<Bytes> {
        let call = self.deployment_call(&params.init_code, &params.replay_protection)?;
        Ok(Self::exec(
            &call,
            &params.replay_protection,
            params.replay_protection_authority,
            &params.signature,
        ))
    }
}
