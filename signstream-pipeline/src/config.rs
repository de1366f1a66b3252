//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline configuration with all options resolved at construction.
///
/// Hosts deserialize this from their own settings store (TOML/JSON) or
/// build it in code; the pipeline never re-merges options mid-lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Soft end-to-end latency threshold (ms); exceeding it fires a
    /// latency warning event.
    pub target_latency_ms: u64,

    /// Hard latency ceiling (ms); exceeding it shrinks the batch delay.
    pub max_latency_ms: u64,

    /// Quiet period after the last final segment before a batch flushes (ms).
    pub batch_delay_ms: u64,

    /// Floor the adaptive controller never shrinks the batch delay below (ms).
    pub min_batch_delay_ms: u64,

    /// Pending word count that flushes a batch immediately.
    pub max_batch_size: usize,

    /// Retry bound for recoverable stage errors.
    pub max_retries: u32,

    /// Delay between stage retries (ms).
    pub retry_delay_ms: u64,

    /// Error count that trips the circuit breaker.
    pub circuit_breaker_threshold: u32,

    /// Error-counting window and post-trip cooldown (ms).
    pub circuit_breaker_timeout_ms: u64,

    /// Whether the periodic metrics/status events are emitted.
    pub enable_metrics: bool,

    /// Interval between metrics events while streaming (ms).
    pub metrics_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_latency_ms: 500,
            max_latency_ms: 2000,
            batch_delay_ms: 150,
            min_batch_delay_ms: 50,
            max_batch_size: 10,
            max_retries: 3,
            retry_delay_ms: 1000,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_ms: 30_000,
            enable_metrics: true,
            metrics_interval_ms: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_delay_ms, 150);
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.min_batch_delay_ms, 50);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"batchDelayMs": 75}"#).unwrap();
        assert_eq!(config.batch_delay_ms, 75);
        assert_eq!(config.max_batch_size, 10);
    }
}
