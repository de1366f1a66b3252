//! Lifecycle state enums for the pipeline and the connection layer

use serde::{Deserialize, Serialize};

/// Pipeline lifecycle state.
///
/// Exactly one pipeline instance owns this value at a time; observers see
/// it only through the event channel. The legal transition table lives in
/// the pipeline crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Initializing,
    Ready,
    Streaming,
    Paused,
    Error,
    Recovering,
    Stopping,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Initializing => "initializing",
            PipelineState::Ready => "ready",
            PipelineState::Streaming => "streaming",
            PipelineState::Paused => "paused",
            PipelineState::Error => "error",
            PipelineState::Recovering => "recovering",
            PipelineState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Connection lifecycle state, owned by a single connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
    Suspended,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
            ConnectionState::Suspended => "suspended",
        };
        write!(f, "{}", s)
    }
}

/// Derived connection quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl ConnectionQuality {
    /// Classify from the current rolling statistics.
    ///
    /// `packet_loss` is a fraction in 0.0..=1.0. Thresholds are checked
    /// worst-first so that a single bad signal dominates.
    pub fn classify(
        average_latency_ms: f64,
        jitter_ms: f64,
        packet_loss: f64,
        missed_heartbeats: u32,
    ) -> Self {
        if packet_loss > 0.10 || missed_heartbeats > 3 {
            ConnectionQuality::Critical
        } else if average_latency_ms > 500.0 || jitter_ms > 200.0 || packet_loss > 0.05 {
            ConnectionQuality::Poor
        } else if average_latency_ms > 200.0 || jitter_ms > 100.0 || packet_loss > 0.02 {
            ConnectionQuality::Fair
        } else if average_latency_ms > 100.0 || jitter_ms > 50.0 {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Excellent
        }
    }
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_high_latency_is_poor() {
        // avg 600ms with stable jitter and no loss classifies on latency alone
        let q = ConnectionQuality::classify(600.0, 50.0, 0.0, 0);
        assert_eq!(q, ConnectionQuality::Poor);
    }

    #[test]
    fn test_quality_low_latency_is_excellent() {
        let q = ConnectionQuality::classify(50.0, 10.0, 0.0, 0);
        assert_eq!(q, ConnectionQuality::Excellent);
    }

    #[test]
    fn test_quality_packet_loss_dominates() {
        let q = ConnectionQuality::classify(20.0, 5.0, 0.11, 0);
        assert_eq!(q, ConnectionQuality::Critical);

        let q = ConnectionQuality::classify(20.0, 5.0, 0.06, 0);
        assert_eq!(q, ConnectionQuality::Poor);

        let q = ConnectionQuality::classify(20.0, 5.0, 0.03, 0);
        assert_eq!(q, ConnectionQuality::Fair);
    }

    #[test]
    fn test_quality_missed_heartbeats_are_critical() {
        let q = ConnectionQuality::classify(20.0, 5.0, 0.0, 4);
        assert_eq!(q, ConnectionQuality::Critical);

        // Three misses is the force-close point but not yet critical
        let q = ConnectionQuality::classify(20.0, 5.0, 0.0, 3);
        assert_eq!(q, ConnectionQuality::Excellent);
    }

    #[test]
    fn test_quality_jitter_boundaries() {
        assert_eq!(
            ConnectionQuality::classify(50.0, 60.0, 0.0, 0),
            ConnectionQuality::Good
        );
        assert_eq!(
            ConnectionQuality::classify(50.0, 120.0, 0.0, 0),
            ConnectionQuality::Fair
        );
        assert_eq!(
            ConnectionQuality::classify(50.0, 250.0, 0.0, 0),
            ConnectionQuality::Poor
        );
    }

    #[test]
    fn test_state_serialization_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&PipelineState::Streaming).unwrap(),
            "\"streaming\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionState::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
    }
}
