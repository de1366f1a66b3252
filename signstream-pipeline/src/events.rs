//! Typed event channel for pipeline observers

use signstream_types::{
    PipelineMetrics, PipelineState, PipelineStatusSnapshot, SignDirective, StageError,
    TranscriptSegment, Translation,
};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel behind the event bus.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the pipeline tells the outside world.
///
/// A closed tagged union: every handler match is exhaustively checkable.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Lifecycle transition (already validated against the table)
    StateChange {
        from: PipelineState,
        to: PipelineState,
    },

    /// A transcript segment was received (interim or final)
    Transcription { segment: TranscriptSegment },

    /// A batch finished translating
    Translation { translation: Translation },

    /// Sign directives ready for animation, with the batch source text
    Signs {
        signs: Vec<SignDirective>,
        text: String,
    },

    /// Periodic status snapshot for mirroring to remote displays
    Status { snapshot: PipelineStatusSnapshot },

    /// Periodic metrics tick
    Metrics { metrics: PipelineMetrics },

    /// A stage error was recorded
    Error {
        error: StageError,
        recoverable: bool,
    },

    /// End-to-end latency exceeded the soft target (informational)
    LatencyWarning { latency_ms: f64, target_ms: u64 },
}

/// Broadcast fan-out for [`PipelineEvent`]s.
///
/// Subscribers each get their own receiver; a slow or dropped subscriber
/// never blocks delivery to the others.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit to all current subscribers. Send only fails when there are no
    /// subscribers, which is not an error for an embedded library.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_emission_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(PipelineEvent::StateChange {
            from: PipelineState::Idle,
            to: PipelineState::Initializing,
        });
        bus.emit(PipelineEvent::LatencyWarning {
            latency_ms: 600.0,
            target_ms: 500,
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::StateChange { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::LatencyWarning { .. }
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.emit(PipelineEvent::LatencyWarning {
            latency_ms: 1.0,
            target_ms: 500,
        });
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = PipelineEvent::LatencyWarning {
            latency_ms: 720.5,
            target_ms: 500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"latency_warning\""));
    }
}
