//! Retry policy for outbound provider calls (§7 "Retries").
//!
//! Retries are keyed on [`ProviderError::is_retryable`] — the same
//! transient/terminal split `neuron-types` already draws between
//! `Network`/`RateLimit`/`ModelLoading`/`Timeout`/`ServiceUnavailable` (retry)
//! and everything else (don't). `TOOL_VALIDATION_FAILED` and other
//! `GatewayError`s never reach this policy; it only wraps provider calls.

use std::future::Future;
use std::time::Duration;

use neuron_types::ProviderError;

/// Exponential backoff with a fixed retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Run `attempt`, retrying on a retryable [`ProviderError`] with
    /// exponential backoff (1s, 2s, 4s by default) until `max_retries` is
    /// exhausted or a non-retryable error (or success) is returned.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut delay = self.base_delay;
        let mut tries_left = self.max_retries;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && tries_left > 0 => {
                    tracing::warn!(error = %err, remaining = tries_left, "retrying provider call");
                    tokio::time::sleep(delay).await;
                    tries_left -= 1;
                    delay *= self.multiplier;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_without_retrying_on_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
        };
        let result = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProviderError>(42) }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
        };
        let result = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(ProviderError::RateLimit { retry_after: None }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(ProviderError::Authentication("bad key".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
