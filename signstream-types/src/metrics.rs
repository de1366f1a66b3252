//! Metrics models: bounded latency history and counter snapshots

use crate::error::StageError;
use crate::state::{ConnectionQuality, PipelineState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many latency samples the rolling window retains.
pub const LATENCY_WINDOW: usize = 100;

/// Rolling latency statistics over the current window.
///
/// Average/min/max are recomputed from the full window on every snapshot,
/// not exponentially decayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    /// Most recent sample (ms), 0 when no samples yet
    pub current_ms: f64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub samples: usize,
}

/// Bounded history of latency samples (last [`LATENCY_WINDOW`]).
#[derive(Debug, Clone, Default)]
pub struct LatencyHistory {
    samples: VecDeque<f64>,
}

impl LatencyHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    /// Record a sample in milliseconds, evicting the oldest when full.
    pub fn record(&mut self, latency_ms: f64) {
        if self.samples.len() == LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Mean over the current window, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Standard deviation of the window, the jitter signal.
    pub fn jitter(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let mean = self.average();
        let variance = self
            .samples
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }

    /// Full-window statistics snapshot.
    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }
        let current_ms = *self.samples.back().unwrap_or(&0.0);
        let min_ms = self.samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_ms = self
            .samples
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        LatencyStats {
            current_ms,
            average_ms: self.average(),
            min_ms,
            max_ms,
            samples: self.samples.len(),
        }
    }
}

/// Monotonically accumulating pipeline counters plus the latency window.
///
/// Reset only by full pipeline reconstruction, never partially.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    pub transcriptions_received: u64,
    pub words_transcribed: u64,
    pub signs_generated: u64,
    pub errors: u64,
    pub recoveries: u64,
    pub circuit_breaker_trips: u64,
    pub latency: LatencyStats,
}

/// Pipeline status as mirrored to remote display surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatusSnapshot {
    pub state: PipelineState,
    pub metrics: PipelineMetrics,
    pub recent_errors: Vec<StageError>,
}

/// Per-connection counters plus derived quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub reconnect_count: u64,
    pub latency: LatencyStats,
    pub jitter_ms: f64,

    /// Fraction of liveness probes that went unanswered, 0.0..=1.0
    pub packet_loss: f64,
    pub missed_heartbeats: u32,
    pub quality: ConnectionQuality,
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self {
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            reconnect_count: 0,
            latency: LatencyStats::default(),
            jitter_ms: 0.0,
            packet_loss: 0.0,
            missed_heartbeats: 0,
            quality: ConnectionQuality::Excellent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bounded_at_window() {
        let mut history = LatencyHistory::new();
        for i in 0..250 {
            history.record(i as f64);
        }
        assert_eq!(history.len(), LATENCY_WINDOW);

        // Window holds samples 150..=249
        let stats = history.stats();
        assert_eq!(stats.min_ms, 150.0);
        assert_eq!(stats.max_ms, 249.0);
        assert_eq!(stats.current_ms, 249.0);
        assert!((stats.average_ms - 199.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history_stats() {
        let history = LatencyHistory::new();
        let stats = history.stats();
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.average_ms, 0.0);
        assert_eq!(history.jitter(), 0.0);
    }

    #[test]
    fn test_jitter_is_standard_deviation() {
        let mut history = LatencyHistory::new();
        for s in [100.0, 100.0, 100.0, 100.0] {
            history.record(s);
        }
        assert_eq!(history.jitter(), 0.0);

        let mut history = LatencyHistory::new();
        for s in [90.0, 110.0, 90.0, 110.0] {
            history.record(s);
        }
        assert!((history.jitter() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_consistent_with_window() {
        let mut history = LatencyHistory::new();
        history.record(10.0);
        history.record(30.0);
        let stats = history.stats();
        assert_eq!(stats.min_ms, 10.0);
        assert_eq!(stats.max_ms, 30.0);
        assert_eq!(stats.average_ms, 20.0);
        assert_eq!(stats.current_ms, 30.0);
        assert_eq!(stats.samples, 2);
    }
}
