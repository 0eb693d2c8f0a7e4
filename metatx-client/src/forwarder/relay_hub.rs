use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use metatx_types::{CallKind, MetaCall};

use super::{DeploymentParams, ForwardParams, ForwarderCore, ReplayBinding};
use crate::contracts::IRelayHub;
use crate::encoding::encode_hub_call_data;
use crate::error::{MetaTxError, Result};

/// Forwarder for the shared relay hub.
///
/// The hub calls the target itself and appends the signer so the target can treat it as
/// `msg.sender`; it cannot forward native value or delegatecall.
pub struct RelayHubForwarder {
    pub(super) core: ForwarderCore,
    hub: Address,
}

impl RelayHubForwarder {
    pub(super) fn new(core: ForwarderCore, hub: Address) -> Self {
        Self { core, hub }
    }

    pub fn address(&self) -> Address {
        self.hub
    }

    pub(super) fn check_call(call: &MetaCall) -> Result<()> {
        if call.value != U256::ZERO {
            return Err(MetaTxError::Encoding(
                "relay hub calls cannot carry native value".to_string(),
            ));
        }
        if call.kind != CallKind::Call {
            return Err(MetaTxError::Encoding(
                "relay hub does not support delegatecall".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) fn call_digest(&self, call: &MetaCall, replay: &ReplayBinding<'_>) -> B256 {
        self.core
            .payload(encode_hub_call_data(call.target, &call.data), replay, self.hub)
            .signing_hash()
    }

    pub(super) fn deployment_digest(&self, init_code: &Bytes, replay: &ReplayBinding<'_>) -> B256 {
        self.core
            .payload(init_code.clone(), replay, self.hub)
            .signing_hash()
    }

    pub(super) fn encode_call(&self, params: &ForwardParams) -> Result<Bytes> {
        Self::check_call(&params.call())?;
        Ok(IRelayHub::forwardCall {
            target: params.target,
            callData: params.data.clone(),
            replayProtection: params.replay_protection.clone(),
            replayProtectionAuthority: params.replay_protection_authority,
            signer: params.signer,
            signature: params.signature.clone(),
        }
        .abi_encode()
        .into())
    }

    pub(super) fn encode_deployment(&self, params: &DeploymentParams) -> Bytes {
        IRelayHub::deployContractCall {
            initCode: params.init_code.clone(),
            replayProtection: params.replay_protection.clone(),
            replayProtectionAuthority: params.replay_protection_authority,
            signer: params.signer,
            signature: params.signature.clone(),
        }
        .abi_encode()
        .into()
    }
}
