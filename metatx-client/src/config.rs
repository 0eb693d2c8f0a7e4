//! Per-chain contract addresses and client settings.
//!
//! Loaded from JSON, e.g.
//!
//! ```json
//! {
//!   "chains": {
//!     "11155111": {
//!       "relay_hub": "0x...",
//!       "proxy_deployer": "0x...",
//!       "proxy_base_account": "0x...",
//!       "multi_send": "0x..."
//!     }
//!   },
//!   "retry": { "max_attempts": 4, "initial_backoff_ms": 250, "max_backoff_ms": 4000 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{MetaTxError, Result};
use crate::retry::RetryPolicy;

/// Verifier and helper contracts deployed on one chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainAddresses {
    /// Shared relay hub (hub-style forwarder).
    pub relay_hub: Option<Address>,
    /// CREATE2 factory for proxy accounts and smart wallets.
    pub proxy_deployer: Option<Address>,
    /// Implementation behind each proxy account.
    pub proxy_base_account: Option<Address>,
    /// Implementation behind each smart wallet.
    pub wallet_singleton: Option<Address>,
    /// Batch executor.
    pub multi_send: Option<Address>,
    /// CREATE2 library smart wallets delegatecall for meta-deployments.
    pub create2_deployer: Option<Address>,
}

impl ChainAddresses {
    pub(crate) fn require(field: Option<Address>, name: &str, chain_id: u64) -> Result<Address> {
        field.ok_or_else(|| {
            MetaTxError::Configuration(format!("no {name} configured for chain {chain_id}"))
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    #[serde(default)]
    pub chains: BTreeMap<u64, ChainAddresses>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ForwarderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MetaTxError::Configuration(format!("invalid forwarder config: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MetaTxError::Configuration(format!("failed reading {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_chain(mut self, chain_id: u64, addresses: ChainAddresses) -> Self {
        self.chains.insert(chain_id, addresses);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chain(&self, chain_id: u64) -> Result<&ChainAddresses> {
        self.chains
            .get(&chain_id)
            .ok_or_else(|| MetaTxError::Configuration(format!("unknown chain id {chain_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "chains": {
            "3": {
                "relay_hub": "0x1111111111111111111111111111111111111111",
                "proxy_deployer": "0x2222222222222222222222222222222222222222",
                "proxy_base_account": "0x3333333333333333333333333333333333333333"
            }
        },
        "retry": { "max_attempts": 2 }
    }"#;

    #[test]
    fn parses_chain_table() {
        let config = ForwarderConfig::from_json_str(CONFIG).unwrap();
        let chain = config.chain(3).unwrap();
        assert_eq!(chain.relay_hub, Some(Address::repeat_byte(0x11)));
        assert_eq!(chain.multi_send, None);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(
            config.retry.initial_backoff_ms,
            RetryPolicy::default().initial_backoff_ms
        );
    }

    #[test]
    fn unknown_chain_is_configuration_error() {
        let config = ForwarderConfig::from_json_str(CONFIG).unwrap();
        assert!(matches!(config.chain(1), Err(MetaTxError::Configuration(_))));
    }

    #[test]
    fn missing_address_is_configuration_error() {
        let config = ForwarderConfig::from_json_str(CONFIG).unwrap();
        let chain = config.chain(3).unwrap();
        let err = ChainAddresses::require(chain.wallet_singleton, "wallet singleton", 3).unwrap_err();
        assert!(err.to_string().contains("wallet singleton"));
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        assert!(matches!(
            ForwarderConfig::from_json_str("{ not json"),
            Err(MetaTxError::Configuration(_))
        ));
    }
}
