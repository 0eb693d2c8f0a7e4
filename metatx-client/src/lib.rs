//! Client-side meta-transactions.
//!
//! Builds, signs and encodes calls that a relayer submits to a verifier contract on the
//! signer's behalf. The verifier checks the signature and a one-shot replay-protection
//! token before executing the call.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use alloy_primitives::{address, Bytes};
//! use metatx_client::{
//!     mock::MockChain, ChainAddresses, ForwarderBuilder, ForwarderConfig, ForwarderKind,
//!     LocalSigner, MetaCall, ReplayProtectionConfig,
//! };
//!
//! # async fn run() -> metatx_client::Result<()> {
//! let config = ForwarderConfig::default().with_chain(
//!     3,
//!     ChainAddresses {
//!         relay_hub: Some(address!("1111111111111111111111111111111111111111")),
//!         ..Default::default()
//!     },
//! );
//! let forwarder = ForwarderBuilder::new(config, ForwarderKind::RelayHub, 3)
//!     .replay_protection(ReplayProtectionConfig::multi_nonce(4))
//!     .build(Arc::new(LocalSigner::random()), Arc::new(MockChain::new()))?;
//!
//! let call = MetaCall::new(address!("abababababababababababababababababababab"), Bytes::new());
//! let params = forwarder.sign_meta_transaction(&call).await?;
//! let wire = forwarder.encode_signed_meta_transaction(&params)?;
//! forwarder.dispatch(wire).await?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod batcher;
pub mod config;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod forwarder;
pub mod mock;
pub mod replay;
pub mod retry;
pub mod signer;


pub use config::{ChainAddresses, ForwarderConfig};
pub use error::{MetaTxError, Result};
pub use forwarder::{DeploymentParams, ForwardParams, Forwarder, ForwarderBuilder, ForwarderKind};
pub use metatx_types::{
    BatchEntry, CallKind, ChainClient, MetaCall, ProviderError, ReplayToken, BIT_FLIP_AUTHORITY,
    MULTI_NONCE_AUTHORITY,
};
pub use replay::{ReplayProtectionAuthority, ReplayProtectionConfig, ReplayScheme};
pub use retry::RetryPolicy;
pub use signer::{recover_signer, LocalSigner, MetaSigner};
