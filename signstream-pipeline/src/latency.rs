//! End-to-end latency tracking and the adaptive batch-delay controller

use signstream_types::{LatencyHistory, LatencyStats};

/// What recording a sample decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyVerdict {
    /// Sample exceeded the soft target; emit a latency warning.
    pub warn: bool,
    /// Sample exceeded the hard ceiling; the new (shrunk) batch delay in ms.
    pub adapted_delay_ms: Option<u64>,
}

/// Tracks end-to-end translation latency and tunes the batch delay.
///
/// Adaptation is one-directional: the delay shrinks multiplicatively
/// (x0.8, floored at the configured minimum) when the ceiling is exceeded
/// and is never grown back. Once the system has been under strain the
/// trade permanently favors responsiveness over batching efficiency.
pub struct LatencyController {
    history: LatencyHistory,
    target_ms: u64,
    max_ms: u64,
    min_delay_ms: u64,
}

impl LatencyController {
    pub fn new(target_ms: u64, max_ms: u64, min_delay_ms: u64) -> Self {
        Self {
            history: LatencyHistory::new(),
            target_ms,
            max_ms,
            min_delay_ms,
        }
    }

    /// Record one end-to-end sample and decide on warning/adaptation.
    pub fn record(&mut self, latency_ms: f64, current_delay_ms: u64) -> LatencyVerdict {
        self.history.record(latency_ms);

        let warn = latency_ms > self.target_ms as f64;
        let adapted_delay_ms = if latency_ms > self.max_ms as f64 {
            let shrunk = ((current_delay_ms as f64) * 0.8) as u64;
            let next = shrunk.max(self.min_delay_ms);
            (next != current_delay_ms).then_some(next)
        } else {
            None
        };

        LatencyVerdict {
            warn,
            adapted_delay_ms,
        }
    }

    pub fn stats(&self) -> LatencyStats {
        self.history.stats()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_target_no_action() {
        let mut ctl = LatencyController::new(500, 2000, 50);
        let verdict = ctl.record(120.0, 150);
        assert!(!verdict.warn);
        assert_eq!(verdict.adapted_delay_ms, None);
    }

    #[test]
    fn test_over_target_warns_without_adapting() {
        let mut ctl = LatencyController::new(500, 2000, 50);
        let verdict = ctl.record(800.0, 150);
        assert!(verdict.warn);
        assert_eq!(verdict.adapted_delay_ms, None);
    }

    #[test]
    fn test_over_ceiling_shrinks_delay() {
        let mut ctl = LatencyController::new(500, 2000, 50);
        let verdict = ctl.record(2500.0, 150);
        assert!(verdict.warn);
        assert_eq!(verdict.adapted_delay_ms, Some(120));
    }

    #[test]
    fn test_delay_floors_at_minimum() {
        let mut ctl = LatencyController::new(500, 2000, 50);
        let mut delay = 150u64;
        for _ in 0..20 {
            if let Some(next) = ctl.record(5000.0, delay).adapted_delay_ms {
                assert!(next < delay);
                delay = next;
            }
        }
        assert_eq!(delay, 50);

        // At the floor, no further adaptation is reported
        let verdict = ctl.record(5000.0, delay);
        assert_eq!(verdict.adapted_delay_ms, None);
    }

    #[test]
    fn test_delay_never_grows_back() {
        // The controller has no restore path: fast samples after a spike
        // leave the shrunk delay untouched.
        let mut ctl = LatencyController::new(500, 2000, 50);
        let delay = ctl.record(2500.0, 150).adapted_delay_ms.unwrap();
        let verdict = ctl.record(10.0, delay);
        assert_eq!(verdict.adapted_delay_ms, None);
        assert!(!verdict.warn);
    }

    #[test]
    fn test_stats_reflect_window() {
        let mut ctl = LatencyController::new(500, 2000, 50);
        ctl.record(100.0, 150);
        ctl.record(300.0, 150);
        let stats = ctl.stats();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.average_ms, 200.0);
        assert_eq!(stats.min_ms, 100.0);
        assert_eq!(stats.max_ms, 300.0);
    }
}
