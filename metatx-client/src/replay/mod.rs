//! Replay-protection authorities.
//!
//! An authority hands out tokens the verifier accepts exactly once. Two schemes are
//! supported:
//! - multi-nonce: `N` independent ordered queues, visited round-robin;
//! - bit-flip: one-shot bits in 256-bit bitmaps, allowing any submission order.
//!
//! State is cached locally after a single seeding read per queue or bitmap. The cache
//! assumes this process is the only writer for the signer; tokens abandoned before
//! submission are never reclaimed.

mod bit_flip;
mod multi_nonce;

pub use bit_flip::{
    bitmap_key, find_empty_bit, flip_bit, random_start_index, BitFlip, BITMAP_RESERVED_INDEXES,
    MAX_BITMAP_ADVANCES,
};
pub use multi_nonce::{queue_key, MultiNonce};

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use metatx_types::{ChainClient, ReplayToken, BIT_FLIP_AUTHORITY, MULTI_NONCE_AUTHORITY};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{MetaTxError, Result};
use crate::retry::RetryPolicy;

/// Which allocation strategy an authority runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ReplayScheme {
    MultiNonce {
        concurrency: u32,
    },
    BitFlip {
        /// First bitmap index to use; random above the reserved band when unset.
        #[serde(default)]
        start_index: Option<U256>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayProtectionConfig {
    #[serde(flatten)]
    pub scheme: ReplayScheme,
    /// External authority contract; the verifier's built-in checker when unset.
    #[serde(default)]
    pub authority: Option<Address>,
}

impl Default for ReplayProtectionConfig {
    fn default() -> Self {
        Self::multi_nonce(1)
    }
}

impl ReplayProtectionConfig {
    pub fn multi_nonce(concurrency: u32) -> Self {
        Self {
            scheme: ReplayScheme::MultiNonce { concurrency },
            authority: None,
        }
    }

    pub fn bit_flip() -> Self {
        Self {
            scheme: ReplayScheme::BitFlip { start_index: None },
            authority: None,
        }
    }

    pub fn with_start_index(mut self, index: U256) -> Self {
        if let ReplayScheme::BitFlip { start_index } = &mut self.scheme {
            *start_index = Some(index);
        }
        self
    }

    pub fn with_authority(mut self, authority: Address) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Address the verifier uses to pick its checking strategy.
    pub fn identifier(&self) -> Result<Address> {
        match (self.authority, &self.scheme) {
            (Some(authority), _) => {
                if authority == MULTI_NONCE_AUTHORITY || authority == BIT_FLIP_AUTHORITY {
                    return Err(MetaTxError::Configuration(format!(
                        "external replay-protection authority {authority} collides with a built-in sentinel"
                    )));
                }
                Ok(authority)
            }
            (None, ReplayScheme::MultiNonce { .. }) => Ok(MULTI_NONCE_AUTHORITY),
            (None, ReplayScheme::BitFlip { .. }) => Ok(BIT_FLIP_AUTHORITY),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let ReplayScheme::MultiNonce { concurrency: 0 } = self.scheme {
            return Err(MetaTxError::Configuration(
                "multi-nonce concurrency must be at least 1".to_string(),
            ));
        }
        self.identifier().map(|_| ())
    }
}

/// Reads seed values from the contract holding the signer's nonce store.
pub struct NonceSource<'a> {
    client: &'a dyn ChainClient,
    retry: &'a RetryPolicy,
    store: Address,
}

impl<'a> NonceSource<'a> {
    pub fn new(client: &'a dyn ChainClient, retry: &'a RetryPolicy, store: Address) -> Self {
        Self { client, retry, store }
    }

    /// `nonceStore(key)`, or zero while the store contract is not deployed yet.
    pub async fn read(&self, key: B256) -> Result<U256> {
        let code = self
            .retry
            .run("code_at", || self.client.code_at(self.store))
            .await?;
        if code.is_empty() {
            debug!(
                target: "metatx::replay",
                store = %self.store,
                %key,
                "nonce store not deployed, seeding with zero"
            );
            return Ok(U256::ZERO);
        }
        self.retry
            .run("nonce_store", || self.client.nonce_store(self.store, key))
            .await
    }
}

enum SchemeState {
    MultiNonce(MultiNonce),
    BitFlip(BitFlip),
}

impl SchemeState {
    fn new(scheme: &ReplayScheme) -> Self {
        match scheme {
            ReplayScheme::MultiNonce { concurrency } => {
                SchemeState::MultiNonce(MultiNonce::new(*concurrency))
            }
            ReplayScheme::BitFlip { start_index } => {
                SchemeState::BitFlip(BitFlip::new(*start_index))
            }
        }
    }
}

struct AuthorityState {
    target: Address,
    scheme: SchemeState,
}

/// Replay-protection authority for one signer against one dispatch target.
///
/// Allocation is a read-scan-write over cached state; the whole sequence runs under this
/// instance's async mutex. Share the authority behind an `Arc` to allocate from several
/// tasks. Separate instances share nothing.
pub struct ReplayProtectionAuthority {
    signer: Address,
    identifier: Address,
    external: bool,
    scheme: ReplayScheme,
    client: Arc<dyn ChainClient>,
    retry: RetryPolicy,
    state: Mutex<AuthorityState>,
}

impl ReplayProtectionAuthority {
    pub fn new(
        config: &ReplayProtectionConfig,
        signer: Address,
        target: Address,
        client: Arc<dyn ChainClient>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        config.validate()?;
        let identifier = config.identifier()?;
        Ok(Self {
            signer,
            identifier,
            external: config.authority.is_some(),
            scheme: config.scheme.clone(),
            client,
            retry,
            state: Mutex::new(AuthorityState {
                target,
                scheme: SchemeState::new(&config.scheme),
            }),
        })
    }

    pub fn identifier(&self) -> Address {
        self.identifier
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn scheme(&self) -> &ReplayScheme {
        &self.scheme
    }

    pub async fn dispatch_target(&self) -> Address {
        self.state.lock().await.target
    }

    /// Allocate the next token, encoded as the verifier expects.
    pub async fn allocate(&self) -> Result<Bytes> {
        self.allocate_token().await.map(|token| token.encode())
    }

    pub async fn allocate_token(&self) -> Result<ReplayToken> {
        let mut state = self.state.lock().await;
        let store = if self.external { self.identifier } else { state.target };
        let source = NonceSource::new(self.client.as_ref(), &self.retry, store);

        let token = match &mut state.scheme {
            SchemeState::MultiNonce(queues) => queues.allocate(self.signer, &source).await?,
            SchemeState::BitFlip(bitmaps) => bitmaps.allocate(self.signer, &source).await?,
        };

        debug!(
            target: "metatx::replay",
            signer = %self.signer,
            authority = %self.identifier,
            index = %token.index,
            nonce = %token.nonce,
            "allocated replay-protection token"
        );
        Ok(token)
    }

    /// Point the authority at a new dispatch target, dropping cached state if it changed.
    pub async fn retarget(&self, target: Address) {
        let mut state = self.state.lock().await;
        if state.target != target {
            info!(
                target: "metatx::replay",
                signer = %self.signer,
                from = %state.target,
                to = %target,
                "dispatch target changed, replay-protection cache invalidated"
            );
            state.target = target;
            state.scheme = SchemeState::new(&self.scheme);
        }
    }

    /// Drop cached state so the next allocation reseeds from the chain.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        info!(
            target: "metatx::replay",
            signer = %self.signer,
            "replay-protection cache reset"
        );
        state.scheme = SchemeState::new(&self.scheme);
    }
}
