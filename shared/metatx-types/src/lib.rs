//! Shared types for meta-transaction calls, replay-protection tokens, and the chain
//! collaborator used to read verifier state.

pub mod call;
pub mod provider;
pub mod replay;

pub use call::{BatchEntry, CallKind, MetaCall};
pub use provider::{ChainClient, ProviderError};
pub use replay::{ReplayToken, BIT_FLIP_AUTHORITY, MULTI_NONCE_AUTHORITY};
