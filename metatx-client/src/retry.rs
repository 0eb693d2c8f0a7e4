//! Bounded retry with exponential backoff for chain reads.

use std::future::Future;
use std::time::Duration;

use metatx_types::ProviderError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MetaTxError, Result};

/// Default attempts per read, including the first
const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default delay before the first retry
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;

/// Default cap on a single backoff delay
const DEFAULT_MAX_BACKOFF_MS: u64 = 4_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the attempt budget
    /// is spent.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ProviderError::Transient(reason)) if attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        target: "metatx::retry",
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "transient provider failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(provider_error(operation, attempt, err)),
            }
        }
    }
}

/// Classify a collaborator failure into the client's error taxonomy.
pub(crate) fn provider_error(operation: &'static str, attempts: u32, err: ProviderError) -> MetaTxError {
    match err {
        ProviderError::Transient(_) => MetaTxError::TransientProvider {
            operation,
            attempts,
            source: err,
        },
        ProviderError::ReplayRejected(reason) => MetaTxError::StaleCacheMismatch(reason),
        ProviderError::Unsupported(what) => {
            MetaTxError::Configuration(format!("provider does not support {what} (needed for {operation})"))
        }
    }
}
