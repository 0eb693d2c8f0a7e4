use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use metatx_types::{CallKind, MetaCall};

use super::{DeploymentParams, ForwardParams, ForwarderCore, ReplayBinding};
use crate::contracts::IProxyAccount;
use crate::encoding::{encode_hub_call_data, encode_proxy_call_data};
use crate::error::{MetaTxError, Result};

/// Forwarder for a per-signer proxy account deployed by the proxy factory.
///
/// Plain calls sign `(target, value, data)` and go through `forward`; delegatecalls sign
/// `(target, data)` and go through `delegate`, which cannot carry value.
pub struct ProxyAccountForwarder {
    pub(super) core: ForwarderCore,
    pub(super) factory: Address,
    pub(super) base_account: Address,
    pub(super) address: Address,
}

impl ProxyAccountForwarder {
    pub(super) fn new(
        core: ForwarderCore,
        factory: Address,
        base_account: Address,
        address: Address,
    ) -> Self {
        Self {
            core,
            factory,
            base_account,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub(super) fn check_call(call: &MetaCall) -> Result<()> {
        if call.kind == CallKind::DelegateCall && call.value != U256::ZERO {
            return Err(MetaTxError::Encoding(
                "proxy account delegatecall cannot carry native value".to_string(),
            ));
        }
        Ok(())
    }

    fn call_data(call: &MetaCall) -> Bytes {
        match call.kind {
            CallKind::Call => encode_proxy_call_data(call.target, call.value, &call.data),
            CallKind::DelegateCall => encode_hub_call_data(call.target, &call.data),
        }
    }

    pub(super) fn call_digest(&self, call: &MetaCall, replay: &ReplayBinding<'_>) -> B256 {
        self.core
            .payload(Self::call_data(call), replay, self.address)
            .signing_hash()
    }

    pub(super) fn deployment_digest(&self, init_code: &Bytes, replay: &ReplayBinding<'_>) -> B256 {
        self.core
            .payload(init_code.clone(), replay, self.address)
            .signing_hash()
    }

    pub(super) fn encode_call(&self, params: &ForwardParams) -> Result<Bytes> {
        Self::check_call(&params.call())?;
        let calldata = match params.kind {
            CallKind::Call => IProxyAccount::forwardCall {
                target: params.target,
                value: params.value,
                callData: params.data.clone(),
                replayProtection: params.replay_protection.clone(),
                replayProtectionAuthority: params.replay_protection_authority,
                signature: params.signature.clone(),
            }
            .abi_encode(),
            CallKind::DelegateCall => IProxyAccount::delegateCall {
                target: params.target,
                callData: params.data.clone(),
                replayProtection: params.replay_protection.clone(),
                replayProtectionAuthority: params.replay_protection_authority,
                signature: params.signature.clone(),
            }
            .abi_encode(),
        };
        Ok(calldata.into())
    }

    pub(super) fn encode_deployment(&self, params: &DeploymentParams) -> Bytes {
        IProxyAccount::deployContractCall {
            initCode: params.init_code.clone(),
            replayProtection: params.replay_protection.clone(),
            replayProtectionAuthority: params.replay_protection_authority,
            signature: params.signature.clone(),
        }
        .abi_encode()
        .into()
    }
}
