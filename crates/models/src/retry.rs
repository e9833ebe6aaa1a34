//! Retry with exponential backoff, shared by the session loop and the
//! high-level generation helpers.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, LlmResult};

/// Backoff parameters for retrying retryable provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt (0 disables retrying).
    pub max_retries: u32,
    /// Base delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Apply ±50% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based):
    /// `min(initial · multiplier^attempt, max)`, with optional ±50% jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base = (self.initial_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        #[allow(clippy::cast_precision_loss)]
        let capped = base.min(self.max_delay_ms as f64);
        let final_ms = if self.jitter {
            capped * rand::rng().random_range(0.5..1.5)
        } else {
            capped
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(final_ms.max(0.0) as u64)
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or exhausts
/// the configured retries.
///
/// A `Retry-After` hint from the provider overrides the computed backoff;
/// a hint longer than the delay cap stops retrying immediately, since the
/// provider is telling us not to come back soon.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> LlmResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_retries {
                    return Err(err);
                }
                let delay = match err.retry_after() {
                    Some(hint_secs) => {
                        let hint = Duration::from_secs_f64(hint_secs.max(0.0));
                        if hint > Duration::from_millis(config.max_delay_ms) {
                            return Err(err);
                        }
                        hint
                    }
                    None => config.delay_for_attempt(attempt),
                };
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after error: {err}"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDetails;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 250,
            jitter: false,
        }
    }

    #[test]
    fn delay_follows_capped_exponential() {
        let config = no_jitter();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: LlmResult<()> = retry(&no_jitter(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::Configuration {
                    message: "bad".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_after_beyond_cap_stops() {
        let calls = AtomicU32::new(0);
        let result: LlmResult<()> = retry(&no_jitter(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::RateLimit {
                    message: "slow down".into(),
                    details: ErrorDetails {
                        retry_after: Some(30.0),
                        retryable: true,
                        ..ErrorDetails::default()
                    },
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
