//! Timeout, retry, and bounded fan-out for oracle calls.
//!
//! The oracle is a network-bound shared resource. Each call gets a timeout;
//! transient failures are retried a bounded number of times with exponential
//! backoff; malformed or permanent failures surface immediately.

use super::{Completion, CompletionRequest, GenerationOracle, OracleError};
use crate::config::OracleConfig;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Base backoff delay in milliseconds for retry attempts.
pub const RETRY_BACKOFF_BASE_MS: u64 = 2000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Retry and timeout settings for a single oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            timeout: Duration::from_secs(120),
            backoff_base: Duration::from_millis(RETRY_BACKOFF_BASE_MS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Delay before retry number `attempt` (1-indexed), doubling each time
    /// and capped at [`MAX_BACKOFF_MS`].
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(Duration::from_millis(MAX_BACKOFF_MS))
    }
}

/// Oracle wrapper applying a [`RetryPolicy`] to every call.
pub struct RetryingOracle {
    inner: Arc<dyn GenerationOracle>,
    policy: RetryPolicy,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn GenerationOracle>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl GenerationOracle for RetryingOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.policy.timeout, self.inner.complete(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout {
                    timeout_ms: self.policy.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_transient() && attempt <= self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}): {}; retrying in {}ms",
                        self.inner.name(),
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Run independent requests with at most `concurrency` in flight.
///
/// Results come back in request order. The first failure to complete drops
/// every outstanding sibling call and is returned, however slow the earlier
/// requests are.
pub async fn generate_all(
    oracle: &dyn GenerationOracle,
    requests: &[CompletionRequest],
    concurrency: usize,
) -> Result<Vec<Completion>, OracleError> {
    let mut indexed: Vec<(usize, Completion)> = stream::iter(
        requests
            .iter()
            .enumerate()
            .map(|(index, request)| async move {
                oracle
                    .complete(request)
                    .await
                    .map(|completion| (index, completion))
            }),
    )
    .buffer_unordered(concurrency.max(1))
    .try_collect()
    .await?;

    indexed.sort_unstable_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, completion)| completion).collect())
}
