//! Engine configuration.
//!
//! Every field has a default so a partial TOML table (or none at all) yields a
//! working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between ownership heartbeats of a running extraction.
    pub heartbeat_interval_secs: u64,
    /// Retry policy applied to each node body.
    pub node_retry: RetryConfig,
    /// Concurrent work items in the shared worker pool.
    pub worker_concurrency: usize,
    /// Sampling temperature for classification calls.
    pub llm_temperature: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            node_retry: RetryConfig::default(),
            worker_concurrency: 8,
            llm_temperature: 0.1,
        }
    }
}

impl EngineConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}
