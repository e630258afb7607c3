//! Bounded retry with exponential back-off.
//!
//! Whether an error is retried is decided by the error itself through
//! [`Retryable::retry_policy`]; the loop only bounds attempts and spaces them.

use std::future::Future;
use std::time::Duration;

use ontology::{LlmError, NodeError, RepositoryError, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Errors that know whether re-running the failed operation can help.
pub trait Retryable {
    fn retry_policy(&self) -> RetryPolicy;
}

impl Retryable for NodeError {
    fn retry_policy(&self) -> RetryPolicy {
        NodeError::retry_policy(self)
    }
}

impl Retryable for LlmError {
    fn retry_policy(&self) -> RetryPolicy {
        LlmError::retry_policy(self)
    }
}

impl Retryable for RepositoryError {
    fn retry_policy(&self) -> RetryPolicy {
        RepositoryError::retry_policy(self)
    }
}

/// Attempt bound and back-off schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first. `1` disables retry.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Runs `operation` until it succeeds, returns a non-retryable error, or the
/// attempt budget is spent. The last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let delay = match err.retry_policy() {
                    RetryPolicy::Retryable { after } if attempt < max_attempts => {
                        after.unwrap_or_else(|| config.backoff_for(attempt))
                    }
                    _ => return Err(err),
                };
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable failure; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> NodeError {
        NodeError::Transient {
            message: "connection reset".into(),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            multiplier: 2.0,
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_until_success() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&RetryConfig::default(), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), NodeError> = with_retry(&RetryConfig::default(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), NodeError> = with_retry(&RetryConfig::default(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NodeError::Fatal {
                message: "bad input".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(NodeError::Fatal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
