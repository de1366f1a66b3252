//! Reconnect backoff schedule

use rand::Rng;
use std::time::Duration;

/// Jitter added on top of the exponential delay, exclusive upper bound (ms).
const JITTER_MS: u64 = 1000;

/// Deterministic part of the schedule: `base * 2^(attempt - 1)`, capped.
///
/// `attempt` is 1-based; attempt 0 is treated as 1.
pub fn delay_without_jitter(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    base_ms.saturating_mul(1u64 << exponent).min(max_ms)
}

/// Full reconnect delay for one attempt: exponential backoff plus up to a
/// second of random jitter, capped at the configured maximum.
pub fn reconnect_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
    let delay = delay_without_jitter(attempt, base_ms, max_ms)
        .saturating_add(jitter)
        .min(max_ms);
    Duration::from_millis(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_doubles_per_attempt() {
        assert_eq!(delay_without_jitter(1, 1000, 30_000), 1000);
        assert_eq!(delay_without_jitter(2, 1000, 30_000), 2000);
        assert_eq!(delay_without_jitter(3, 1000, 30_000), 4000);
        assert_eq!(delay_without_jitter(4, 1000, 30_000), 8000);
    }

    #[test]
    fn test_schedule_caps_at_maximum() {
        assert_eq!(delay_without_jitter(6, 1000, 30_000), 30_000);
        assert_eq!(delay_without_jitter(60, 1000, 30_000), 30_000);
    }

    #[test]
    fn test_attempt_zero_treated_as_first() {
        assert_eq!(delay_without_jitter(0, 1000, 30_000), 1000);
    }

    #[test]
    fn test_jittered_delay_stays_within_bounds() {
        for attempt in 1..=12 {
            let delay = reconnect_delay(attempt, 1000, 30_000);
            let floor = delay_without_jitter(attempt, 1000, 30_000);
            assert!(delay >= Duration::from_millis(floor.min(30_000)));
            assert!(delay <= Duration::from_millis(30_000));
        }
    }
}
