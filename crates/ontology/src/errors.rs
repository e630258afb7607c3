//! Error and retry-policy types shared by every SchemaSense crate.
//!
//! Component-level errors that only one orchestration module produces (the DAG
//! engine's `DagError`, the column pipeline's `PipelineError`) live beside
//! that module in the `nodes` crate. The types here cross crate boundaries:
//! they are returned by port implementations and by node executors.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProjectId;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by error types to let the node runner decide whether to re-invoke
/// an operation or fail the node.
///
/// ## Rules
///
/// - `Retryable` errors: LLM timeouts, transient rate-limit responses, 5xx
///   responses, dropped connections, transient storage failures.
/// - `NonRetryable` errors: missing configuration, malformed LLM output,
///   conflicts, anything an executor reports as fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Failure reported by a persistence port.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Record kind, e.g. `"run"`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A uniqueness or state precondition was violated (for example a second
    /// active run for the same datasource).
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the violated precondition.
        message: String,
    },

    /// The backing store failed.
    #[error("storage failure: {message}")]
    Storage {
        /// Driver-level description.
        message: String,
    },
}

impl RepositoryError {
    /// Convenience constructor for [`RepositoryError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`RepositoryError::Storage`].
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Storage failures are treated as transient; everything else is final.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            RepositoryError::Storage { .. } => RetryPolicy::Retryable { after: None },
            RepositoryError::NotFound { .. } | RepositoryError::Conflict { .. } => {
                RetryPolicy::NonRetryable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LLM errors
// ---------------------------------------------------------------------------

/// Failure reported by an [`crate::ports::LlmClient`] or its factory.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    /// No LLM access point is configured for the project.
    #[error("no LLM access point configured for project {project}")]
    NotConfigured {
        /// Project that requested a client.
        project: ProjectId,
    },

    /// The request did not complete within the client timeout.
    #[error("LLM request timed out after {elapsed:?}")]
    Timeout {
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("LLM provider rate limited the request")]
    RateLimited {
        /// Delay advertised by the provider, when present.
        retry_after: Option<Duration>,
    },

    /// The provider returned a non-success status.
    #[error("LLM provider returned status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or provider message.
        message: String,
    },

    /// The connection failed before a response was received.
    #[error("LLM transport failure: {message}")]
    Transport {
        /// Transport-level description.
        message: String,
    },

    /// The response could not be interpreted as the expected JSON document.
    #[error("invalid LLM response: {message}")]
    InvalidResponse {
        /// Parse or validation failure.
        message: String,
    },
}

impl LlmError {
    /// Classifies the error for the retry loop.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::Timeout { .. } | LlmError::Transport { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            LlmError::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            LlmError::Api { status, .. } if *status >= 500 => {
                RetryPolicy::Retryable { after: None }
            }
            LlmError::Api { .. } | LlmError::NotConfigured { .. } | LlmError::InvalidResponse { .. } => {
                RetryPolicy::NonRetryable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Node executor errors
// ---------------------------------------------------------------------------

/// Error returned by a [`crate::ports::NodeExecutor`].
///
/// Executors must be idempotent enough to tolerate re-invocation: the engine
/// re-runs a node body whenever [`NodeError::retry_policy`] says so.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NodeError {
    /// A transient failure; the engine may re-run the node body.
    #[error("{message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// A failure that re-running cannot fix.
    #[error("{message}")]
    Fatal {
        /// Description of the failure.
        message: String,
    },

    /// The node is missing something it needs to run at all.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An LLM call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// A persistence port failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl NodeError {
    /// Classifies the error for the retry loop.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            NodeError::Transient { .. } => RetryPolicy::Retryable { after: None },
            NodeError::Fatal { .. } | NodeError::Configuration { .. } => RetryPolicy::NonRetryable,
            NodeError::Llm(e) => e.retry_policy(),
            NodeError::Repository(e) => e.retry_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_carries_provider_delay() {
        let err = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(3))
            }
        );
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let err = LlmError::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.retry_policy().is_retryable());

        let err = LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        };
        assert!(err.retry_policy().is_retryable());
    }

    #[test]
    fn test_node_error_delegates_to_source() {
        let err = NodeError::from(LlmError::Timeout {
            elapsed: Duration::from_secs(30),
        });
        assert!(err.retry_policy().is_retryable());

        let err = NodeError::from(RepositoryError::Conflict {
            message: "dup".into(),
        });
        assert!(!err.retry_policy().is_retryable());

        let err = NodeError::Configuration {
            message: "no llm".into(),
        };
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
    }
}
