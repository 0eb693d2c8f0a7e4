//! Forwarders: sign meta-transactions for a verifier contract and encode them for dispatch.
//!
//! Three verifier shapes are supported, one enum variant each:
//! - [`RelayHubForwarder`]: a shared hub that calls the target on the signer's behalf;
//! - [`ProxyAccountForwarder`]: a per-signer minimal proxy that can carry value and
//!   delegatecall;
//! - [`SmartWalletForwarder`]: a per-signer wallet verifying EIP-712 typed transactions.
//!
//! A forwarder owns one [`ReplayProtectionAuthority`]. Every signature consumes one token;
//! tokens of signed transactions that are never submitted are not reclaimed.

mod proxy_account;
mod relay_hub;
mod smart_wallet;

pub use proxy_account::ProxyAccountForwarder;
pub use relay_hub::RelayHubForwarder;
pub use smart_wallet::SmartWalletForwarder;

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use metatx_types::{BatchEntry, CallKind, ChainClient, MetaCall};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::{compute_deployed_address_from_code, compute_proxy_address};
use crate::batcher;
use crate::config::{ChainAddresses, ForwarderConfig};
use crate::contracts::IProxyAccountDeployer;
use crate::encoding::{deployment_salt, SigningPayload};
use crate::error::{MetaTxError, Result};
use crate::replay::{ReplayProtectionAuthority, ReplayProtectionConfig};
use crate::retry::{provider_error, RetryPolicy};
use crate::signer::{self, MetaSigner, SIGNATURE_LEN};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwarderKind {
    RelayHub,
    ProxyAccount,
    SmartWallet,
}

/// A signed meta-transaction, ready to be encoded for its verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardParams {
    /// Verifier the wire bytes are sent to.
    pub to: Address,
    pub signer: Address,
    pub target: Address,
    pub value: U256,
    pub data: Bytes,
    pub kind: CallKind,
    pub replay_protection: Bytes,
    pub replay_protection_authority: Address,
    pub chain_id: u64,
    pub signature: Bytes,
}

impl ForwardParams {
    pub fn call(&self) -> MetaCall {
        MetaCall {
            target: self.target,
            value: self.value,
            data: self.data.clone(),
            kind: self.kind,
        }
    }
}

/// A signed meta-deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParams {
    pub to: Address,
    pub signer: Address,
    pub init_code: Bytes,
    pub value: U256,
    pub replay_protection: Bytes,
    pub replay_protection_authority: Address,
    pub chain_id: u64,
    pub signature: Bytes,
}

impl DeploymentParams {
    /// CREATE2 salt the verifier uses: `keccak256(abi.encode(signer, replayProtection))`.
    pub fn salt(&self) -> B256 {
        deployment_salt(self.signer, &self.replay_protection)
    }

    /// Address the contract lands at once the verifier executes the deployment.
    pub fn deployed_address(&self) -> Address {
        compute_deployed_address_from_code(self.to, &self.init_code, self.salt())
    }
}

/// Replay token and authority a signature commits to.
pub(crate) struct ReplayBinding<'a> {
    token: &'a Bytes,
    authority: Address,
}

impl<'a> ReplayBinding<'a> {
    fn of(params: &'a ForwardParams) -> Self {
        Self {
            token: &params.replay_protection,
            authority: params.replay_protection_authority,
        }
    }
}

/// State and collaborators shared by every variant.
pub(crate) struct ForwarderCore {
    chain_id: u64,
    signer: Arc<dyn MetaSigner>,
    client: Arc<dyn ChainClient>,
    replay: Arc<ReplayProtectionAuthority>,
    retry: RetryPolicy,
    multi_send: Option<Address>,
}

impl ForwarderCore {
    fn payload(&self, call_data: Bytes, replay: &ReplayBinding<'_>, target: Address) -> SigningPayload {
        SigningPayload {
            call_data,
            replay_protection: replay.token.clone(),
            replay_protection_authority: replay.authority,
            target,
            chain_id: self.chain_id,
        }
    }

    async fn sign(&self, digest: B256) -> Result<Bytes> {
        let signature = self.signer.sign_hash(digest).await?;
        if signature.len() != SIGNATURE_LEN {
            return Err(MetaTxError::Signer(format!(
                "expected a {SIGNATURE_LEN}-byte signature, got {} bytes",
                signature.len()
            )));
        }
        Ok(signature)
    }
}

pub enum Forwarder {
    RelayHub(RelayHubForwarder),
    ProxyAccount(ProxyAccountForwarder),
    SmartWallet(SmartWalletForwarder),
}

impl Forwarder {
    fn core(&self) -> &ForwarderCore {
        match self {
            Forwarder::RelayHub(f) => &f.core,
            Forwarder::ProxyAccount(f) => &f.core,
            Forwarder::SmartWallet(f) => &f.core,
        }
    }

    pub fn kind(&self) -> ForwarderKind {
        match self {
            Forwarder::RelayHub(_) => ForwarderKind::RelayHub,
            Forwarder::ProxyAccount(_) => ForwarderKind::ProxyAccount,
            Forwarder::SmartWallet(_) => ForwarderKind::SmartWallet,
        }
    }

    /// Dispatch target. Proxy accounts and smart wallets may not be deployed yet.
    pub fn address(&self) -> Address {
        match self {
            Forwarder::RelayHub(f) => f.address(),
            Forwarder::ProxyAccount(f) => f.address(),
            Forwarder::SmartWallet(f) => f.address(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.core().chain_id
    }

    pub fn signer(&self) -> Address {
        self.core().signer.address()
    }

    pub fn replay_protection(&self) -> &Arc<ReplayProtectionAuthority> {
        &self.core().replay
    }

    fn check_call(&self, call: &MetaCall) -> Result<()> {
        match self {
            Forwarder::RelayHub(_) => RelayHubForwarder::check_call(call),
            Forwarder::ProxyAccount(_) => ProxyAccountForwarder::check_call(call),
            Forwarder::SmartWallet(_) => Ok(()),
        }
    }

    fn call_digest(&self, call: &MetaCall, replay: &ReplayBinding<'_>) -> B256 {
        match self {
            Forwarder::RelayHub(f) => f.call_digest(call, replay),
            Forwarder::ProxyAccount(f) => f.call_digest(call, replay),
            Forwarder::SmartWallet(f) => f.call_digest(call, replay),
        }
    }

    fn deployment_digest(&self, init_code: &Bytes, replay: &ReplayBinding<'_>) -> Result<B256> {
        match self {
            Forwarder::RelayHub(f) => Ok(f.deployment_digest(init_code, replay)),
            Forwarder::ProxyAccount(f) => Ok(f.deployment_digest(init_code, replay)),
            Forwarder::SmartWallet(f) => f.deployment_digest(init_code, replay),
        }
    }

    /// Allocate a replay-protection token and sign `call` with it.
    ///
    /// Calls the variant cannot express are rejected before a token is consumed.
    pub async fn sign_meta_transaction(&self, call: &MetaCall) -> Result<ForwardParams> {
        self.check_call(call)?;
        let core = self.core();
        let replay_protection = core.replay.allocate().await?;
        let authority = core.replay.identifier();
        let digest = self.call_digest(
            call,
            &ReplayBinding {
                token: &replay_protection,
                authority,
            },
        );
        let signature = core.sign(digest).await?;

        debug!(
            target: "metatx::forwarder",
            kind = ?self.kind(),
            forwarder = %self.address(),
            call_target = %call.target,
            %digest,
            "signed meta-transaction"
        );

        Ok(ForwardParams {
            to: self.address(),
            signer: core.signer.address(),
            target: call.target,
            value: call.value,
            data: call.data.clone(),
            kind: call.kind,
            replay_protection,
            replay_protection_authority: authority,
            chain_id: core.chain_id,
            signature,
        })
    }

    /// Allocate a token and sign a deployment of `init_code` by the dispatch target.
    pub async fn sign_meta_deployment(&self, init_code: Bytes) -> Result<DeploymentParams> {
        let core = self.core();
        if let Forwarder::SmartWallet(f) = self {
            // fail on a missing deployer before consuming a token
            f.deployment_call(&init_code, &Bytes::new())?;
        }
        let replay_protection = core.replay.allocate().await?;
        let authority = core.replay.identifier();
        let digest = self.deployment_digest(
            &init_code,
            &ReplayBinding {
                token: &replay_protection,
                authority,
            },
        )?;
        let signature = core.sign(digest).await?;

        let params = DeploymentParams {
            to: self.address(),
            signer: core.signer.address(),
            init_code,
            value: U256::ZERO,
            replay_protection,
            replay_protection_authority: authority,
            chain_id: core.chain_id,
            signature,
        };
        debug!(
            target: "metatx::forwarder",
            kind = ?self.kind(),
            forwarder = %params.to,
            deployed = %params.deployed_address(),
            "signed meta-deployment"
        );
        Ok(params)
    }

    fn check_params(&self, to: Address, chain_id: u64) -> Result<()> {
        if to != self.address() {
            return Err(MetaTxError::Encoding(format!(
                "params are for {to}, this forwarder dispatches to {}",
                self.address()
            )));
        }
        if chain_id != self.chain_id() {
            return Err(MetaTxError::Encoding(format!(
                "params are for chain {chain_id}, this forwarder is on chain {}",
                self.chain_id()
            )));
        }
        Ok(())
    }

    /// Calldata for the verifier's forwarding entry point.
    pub fn encode_signed_meta_transaction(&self, params: &ForwardParams) -> Result<Bytes> {
        self.check_params(params.to, params.chain_id)?;
        match self {
            Forwarder::RelayHub(f) => f.encode_call(params),
            Forwarder::ProxyAccount(f) => f.encode_call(params),
            Forwarder::SmartWallet(f) => Ok(f.encode_call(params)),
        }
    }

    /// Calldata for the verifier's deployment entry point.
    pub fn encode_signed_meta_deployment(&self, params: &DeploymentParams) -> Result<Bytes> {
        self.check_params(params.to, params.chain_id)?;
        match self {
            Forwarder::RelayHub(f) => Ok(f.encode_deployment(params)),
            Forwarder::ProxyAccount(f) => Ok(f.encode_deployment(params)),
            Forwarder::SmartWallet(f) => f.encode_deployment(params),
        }
    }

    /// Recover the address that signed `params`, as the verifier would.
    pub fn verify(&self, params: &ForwardParams) -> Result<Address> {
        self.check_params(params.to, params.chain_id)?;
        self.check_call(&params.call())?;
        let digest = self.call_digest(&params.call(), &ReplayBinding::of(params));
        signer::recover_signer(digest, &params.signature)
    }

    pub fn verify_deployment(&self, params: &DeploymentParams) -> Result<Address> {
        self.check_params(params.to, params.chain_id)?;
        let digest = self.deployment_digest(
            &params.init_code,
            &ReplayBinding {
                token: &params.replay_protection,
                authority: params.replay_protection_authority,
            },
        )?;
        signer::recover_signer(digest, &params.signature)
    }

    /// Whether the dispatch target has code.
    pub async fn is_contract_deployed(&self) -> Result<bool> {
        let core = self.core();
        let address = self.address();
        let code = core
            .retry
            .run("code_at", || core.client.code_at(address))
            .await?;
        Ok(!code.is_empty())
    }

    /// Factory call creating the dispatch target, to send before the first
    /// meta-transaction when [`Forwarder::is_contract_deployed`] is false.
    pub fn create_account_call(&self) -> Result<MetaCall> {
        let factory = match self {
            Forwarder::RelayHub(_) => {
                return Err(MetaTxError::Configuration(
                    "the relay hub is shared and has no per-signer account".to_string(),
                ))
            }
            Forwarder::ProxyAccount(f) => f.factory,
            Forwarder::SmartWallet(f) => f.factory,
        };
        let data = IProxyAccountDeployer::createProxyAccountCall {
            signer: self.signer(),
        }
        .abi_encode();
        Ok(MetaCall::new(factory, data))
    }

    /// Sign a batch as a single delegatecall into the configured multi-send contract.
    pub async fn sign_batch(&self, entries: &[BatchEntry]) -> Result<ForwardParams> {
        let core = self.core();
        let multi_send = ChainAddresses::require(core.multi_send, "multi-send", core.chain_id)?;
        let call = batcher::batch(multi_send, entries)?;
        self.sign_meta_transaction(&call).await
    }

    /// Decode a signed batch and check it was signed by `params.signer`.
    pub fn verify_batch(&self, params: &ForwardParams) -> Result<Vec<BatchEntry>> {
        let core = self.core();
        let multi_send = ChainAddresses::require(core.multi_send, "multi-send", core.chain_id)?;
        if params.target != multi_send || params.kind != CallKind::DelegateCall {
            return Err(MetaTxError::Encoding(format!(
                "not a batch: expected a delegatecall to {multi_send}"
            )));
        }
        let entries = batcher::decode_batch(&params.data)?;
        let recovered = self.verify(params)?;
        if recovered != params.signer {
            return Err(MetaTxError::Signer(format!(
                "batch signed by {recovered}, expected {}",
                params.signer
            )));
        }
        Ok(entries)
    }

    /// Submit wire bytes to the dispatch target.
    ///
    /// A replay rejection surfaces as [`MetaTxError::StaleCacheMismatch`]; call
    /// [`Forwarder::reset_replay_protection`] before signing again.
    pub async fn dispatch(&self, wire: Bytes) -> Result<B256> {
        let core = self.core();
        let to = self.address();
        let tx_hash = core
            .client
            .send_transaction(to, wire)
            .await
            .map_err(|e| provider_error("send_transaction", 1, e))?;
        info!(
            target: "metatx::forwarder",
            kind = ?self.kind(),
            forwarder = %to,
            %tx_hash,
            "dispatched meta-transaction"
        );
        Ok(tx_hash)
    }

    pub async fn reset_replay_protection(&self) {
        self.core().replay.reset().await;
    }

    /// Recompute the per-signer account for a new factory or implementation and point
    /// replay protection at it. Returns the new dispatch target.
    pub async fn migrate(&mut self, factory: Address, implementation: Address) -> Result<Address> {
        let signer = self.signer();
        let address = compute_proxy_address(factory, signer, implementation);
        match self {
            Forwarder::RelayHub(_) => {
                return Err(MetaTxError::Configuration(
                    "the relay hub has no per-signer account to migrate".to_string(),
                ))
            }
            Forwarder::ProxyAccount(f) => {
                f.factory = factory;
                f.base_account = implementation;
                f.address = address;
            }
            Forwarder::SmartWallet(f) => {
                f.factory = factory;
                f.singleton = implementation;
                f.address = address;
            }
        }
        self.core().replay.retarget(address).await;
        Ok(address)
    }
}

/// Resolves a forwarder kind and chain into a [`Forwarder`].
///
/// All configuration checks happen in [`ForwarderBuilder::build`], before any chain access.
#[derive(Clone, Debug)]
pub struct ForwarderBuilder {
    config: ForwarderConfig,
    kind: ForwarderKind,
    chain_id: u64,
    replay: ReplayProtectionConfig,
}

impl ForwarderBuilder {
    pub fn new(config: ForwarderConfig, kind: ForwarderKind, chain_id: u64) -> Self {
        Self {
            config,
            kind,
            chain_id,
            replay: ReplayProtectionConfig::default(),
        }
    }

    pub fn replay_protection(mut self, replay: ReplayProtectionConfig) -> Self {
        self.replay = replay;
        self
    }

    pub fn build(self, signer: Arc<dyn MetaSigner>, client: Arc<dyn ChainClient>) -> Result<Forwarder> {
        let chain_id = self.chain_id;
        let addresses = self.config.chain(chain_id)?;
        let signer_address = signer.address();

        // (dispatch target, factory, implementation)
        let (target, account) = match self.kind {
            ForwarderKind::RelayHub => (
                ChainAddresses::require(addresses.relay_hub, "relay hub", chain_id)?,
                None,
            ),
            ForwarderKind::ProxyAccount | ForwarderKind::SmartWallet => {
                let factory =
                    ChainAddresses::require(addresses.proxy_deployer, "proxy deployer", chain_id)?;
                let implementation = if self.kind == ForwarderKind::ProxyAccount {
                    ChainAddresses::require(addresses.proxy_base_account, "proxy base account", chain_id)?
                } else {
                    ChainAddresses::require(addresses.wallet_singleton, "wallet singleton", chain_id)?
                };
                (
                    compute_proxy_address(factory, signer_address, implementation),
                    Some((factory, implementation)),
                )
            }
        };

        let replay = ReplayProtectionAuthority::new(
            &self.replay,
            signer_address,
            target,
            client.clone(),
            self.config.retry.clone(),
        )?;
        let core = ForwarderCore {
            chain_id,
            signer,
            client,
            replay: Arc::new(replay),
            retry: self.config.retry.clone(),
            multi_send: addresses.multi_send,
        };

        info!(
            target: "metatx::forwarder",
            kind = ?self.kind,
            chain_id,
            signer = %signer_address,
            forwarder = %target,
            authority = %core.replay.identifier(),
            "forwarder ready"
        );

        let forwarder = match (self.kind, account) {
            (ForwarderKind::ProxyAccount, Some((factory, base_account))) => Forwarder::ProxyAccount(
                ProxyAccountForwarder::new(core, factory, base_account, target),
            ),
            (ForwarderKind::SmartWallet, Some((factory, singleton))) => Forwarder::SmartWallet(
                SmartWalletForwarder::new(core, factory, singleton, target, addresses.create2_deployer),
            ),
            _ => Forwarder::RelayHub(RelayHubForwarder::new(core, target)),
        };
        Ok(forwarder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;
    use crate::signer::LocalSigner;

    use alloy_primitives::address;
    use metatx_types::{ReplayToken, BIT_FLIP_AUTHORITY, MULTI_NONCE_AUTHORITY};

    const CHAIN_ID: u64 = 3;
    const HUB: Address = address!("1111111111111111111111111111111111111111");
    const FACTORY: Address = address!("2222222222222222222222222222222222222222");
    const BASE: Address = address!("3333333333333333333333333333333333333333");
    const SINGLETON: Address = address!("4444444444444444444444444444444444444444");
    const MULTI_SEND: Address = address!("5555555555555555555555555555555555555555");
    const CREATE2: Address = address!("6666666666666666666666666666666666666666");
    const TARGET: Address = address!("abababababababababababababababababababab");

    fn config() -> ForwarderConfig {
        ForwarderConfig::default()
            .with_chain(
                CHAIN_ID,
                ChainAddresses {
                    relay_hub: Some(HUB),
                    proxy_deployer: Some(FACTORY),
                    proxy_base_account: Some(BASE),
                    wallet_singleton: Some(SINGLETON),
                    multi_send: Some(MULTI_SEND),
                    create2_deployer: Some(CREATE2),
                },
            )
            .with_retry(RetryPolicy::immediate(3))
    }

    fn build(kind: ForwarderKind, chain: Arc<MockChain>) -> (Forwarder, LocalSigner) {
        let signer = LocalSigner::random();
        let forwarder = ForwarderBuilder::new(config(), kind, CHAIN_ID)
            .build(Arc::new(signer.clone()), chain)
            .unwrap();
        (forwarder, signer)
    }

    #[test]
    fn builder_rejects_unknown_chain_and_missing_addresses() {
        let chain = Arc::new(MockChain::new());
        let signer: Arc<dyn MetaSigner> = Arc::new(LocalSigner::random());

        let err = ForwarderBuilder::new(config(), ForwarderKind::RelayHub, 99)
            .build(signer.clone(), chain.clone())
            .err()
            .unwrap();
        assert!(matches!(err, MetaTxError::Configuration(_)));

        let sparse = ForwarderConfig::default().with_chain(
            CHAIN_ID,
            ChainAddresses {
                relay_hub: Some(HUB),
                ..Default::default()
            },
        );
        let err = ForwarderBuilder::new(sparse, ForwarderKind::SmartWallet, CHAIN_ID)
            .build(signer, chain.clone())
            .err()
            .unwrap();
        assert!(matches!(err, MetaTxError::Configuration(_)));
        assert_eq!(chain.nonce_reads(), 0);
    }

    #[test]
    fn per_signer_addresses_are_derived() {
        let chain = Arc::new(MockChain::new());
        let (proxy, signer) = build(ForwarderKind::ProxyAccount, chain.clone());
        assert_eq!(
            proxy.address(),
            compute_proxy_address(FACTORY, signer.address(), BASE)
        );
        let (hub, _) = build(ForwarderKind::RelayHub, chain);
        assert_eq!(hub.address(), HUB);
    }

    #[tokio::test]
    async fn hub_signature_recovers_signer() {
        let chain = Arc::new(MockChain::new());
        let (hub, signer) = build(ForwarderKind::RelayHub, chain);
        let call = MetaCall::new(TARGET, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));

        let params = hub.sign_meta_transaction(&call).await.unwrap();
        assert_eq!(params.to, HUB);
        assert_eq!(params.replay_protection_authority, MULTI_NONCE_AUTHORITY);
        assert_eq!(
            ReplayToken::decode(&params.replay_protection),
            Some(ReplayToken::new(U256::ZERO, U256::ZERO))
        );
        assert_eq!(hub.verify(&params).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn hub_rejects_value_and_delegatecall_without_consuming_tokens() {
        let chain = Arc::new(MockChain::new());
        let (hub, _) = build(ForwarderKind::RelayHub, chain);

        let valued = MetaCall::new(TARGET, Bytes::new()).with_value(U256::from(1));
        assert!(matches!(
            hub.sign_meta_transaction(&valued).await,
            Err(MetaTxError::Encoding(_))
        ));
        let delegated = MetaCall::new(TARGET, Bytes::new()).delegate();
        assert!(matches!(
            hub.sign_meta_transaction(&delegated).await,
            Err(MetaTxError::Encoding(_))
        ));

        let params = hub
            .sign_meta_transaction(&MetaCall::new(TARGET, Bytes::new()))
            .await
            .unwrap();
        let token = ReplayToken::decode(&params.replay_protection).unwrap();
        assert_eq!(token.nonce, U256::ZERO);
    }

    #[tokio::test]
    async fn tampered_params_recover_a_different_signer() {
        let chain = Arc::new(MockChain::new());
        let (proxy, signer) = build(ForwarderKind::ProxyAccount, chain);
        let call = MetaCall::new(TARGET, Bytes::from_static(b"transfer")).with_value(U256::from(7));

        let mut params = proxy.sign_meta_transaction(&call).await.unwrap();
        assert_eq!(proxy.verify(&params).unwrap(), signer.address());
        params.value = U256::from(8);
        assert_ne!(proxy.verify(&params).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn encode_rejects_params_for_another_forwarder() {
        let chain = Arc::new(MockChain::new());
        let (hub, _) = build(ForwarderKind::RelayHub, chain.clone());
        let (proxy, _) = build(ForwarderKind::ProxyAccount, chain);

        let params = proxy
            .sign_meta_transaction(&MetaCall::new(TARGET, Bytes::new()))
            .await
            .unwrap();
        assert!(matches!(
            hub.encode_signed_meta_transaction(&params),
            Err(MetaTxError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn create_account_call_targets_factory() {
        let chain = Arc::new(MockChain::new());
        let (wallet, signer) = build(ForwarderKind::SmartWallet, chain.clone());
        let call = wallet.create_account_call().unwrap();
        assert_eq!(call.target, FACTORY);
        let decoded = IProxyAccountDeployer::createProxyAccountCall::abi_decode(&call.data, true).unwrap();
        assert_eq!(decoded.signer, signer.address());

        let (hub, _) = build(ForwarderKind::RelayHub, chain);
        assert!(matches!(
            hub.create_account_call(),
            Err(MetaTxError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn is_contract_deployed_retries_then_surfaces() {
        let chain = Arc::new(MockChain::new());
        let (proxy, _) = build(ForwarderKind::ProxyAccount, chain.clone());

        chain.fail_next_reads(2);
        assert!(!proxy.is_contract_deployed().await.unwrap());

        chain.deploy(proxy.address());
        chain.fail_next_reads(2);
        assert!(proxy.is_contract_deployed().await.unwrap());

        chain.fail_next_reads(10);
        let err = proxy.is_contract_deployed().await.unwrap_err();
        assert!(matches!(
            err,
            MetaTxError::TransientProvider { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn deployment_address_uses_dispatch_target_as_deployer() {
        let chain = Arc::new(MockChain::new());
        let (proxy, signer) = build(ForwarderKind::ProxyAccount, chain);
        let init_code = Bytes::from_static(&[0x60, 0x00, 0x60, 0x00, 0xf3]);

        let params = proxy.sign_meta_deployment(init_code.clone()).await.unwrap();
        let salt = deployment_salt(signer.address(), &params.replay_protection);
        assert_eq!(params.salt(), salt);
        assert_eq!(
            params.deployed_address(),
            proxy.address().create2_from_code(salt.0, &init_code)
        );
        assert_eq!(proxy.verify_deployment(&params).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn migrate_retargets_replay_protection() {
        let chain = Arc::new(MockChain::new());
        let signer = LocalSigner::random();
        let mut proxy = ForwarderBuilder::new(config(), ForwarderKind::ProxyAccount, CHAIN_ID)
            .build(Arc::new(signer.clone()), chain.clone())
            .unwrap();
        proxy
            .sign_meta_transaction(&MetaCall::new(TARGET, Bytes::new()))
            .await
            .unwrap();

        let new_base = address!("7777777777777777777777777777777777777777");
        let new_address = proxy.migrate(FACTORY, new_base).await.unwrap();
        assert_eq!(new_address, compute_proxy_address(FACTORY, signer.address(), new_base));
        assert_eq!(proxy.address(), new_address);
        assert_eq!(proxy.replay_protection().dispatch_target().await, new_address);

        chain.deploy(new_address);
        chain.set_nonce(new_address, crate::replay::queue_key(signer.address(), 0), U256::from(9));
        let params = proxy
            .sign_meta_transaction(&MetaCall::new(TARGET, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(params.to, new_address);
        let token = ReplayToken::decode(&params.replay_protection).unwrap();
        assert_eq!(token.nonce, U256::from(9));
    }

    #[tokio::test]
    async fn bit_flip_authority_identifier_is_signed() {
        let chain = Arc::new(MockChain::new());
        let signer = LocalSigner::random();
        let wallet = ForwarderBuilder::new(config(), ForwarderKind::SmartWallet, CHAIN_ID)
            .replay_protection(ReplayProtectionConfig::bit_flip().with_start_index(U256::from(1u64 << 40)))
            .build(Arc::new(signer.clone()), chain)
            .unwrap();

        let params = wallet
            .sign_meta_transaction(&MetaCall::new(TARGET, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(params.replay_protection_authority, BIT_FLIP_AUTHORITY);
        assert_eq!(wallet.verify(&params).unwrap(), signer.address());

        let mut forged = params.clone();
        forged.replay_protection_authority = MULTI_NONCE_AUTHORITY;
        assert_ne!(wallet.verify(&forged).unwrap(), signer.address());
    }
}
