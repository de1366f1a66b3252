//! Wire protocol shared with remote displays
//!
//! Every frame is one JSON envelope: `id`, `type`, `payload`, `timestamp`
//! in epoch milliseconds, and an optional `requiresAck`. Payload field
//! names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use signstream_types::{now_ms, LatencyStats, PipelineStatusSnapshot, SignDirective};

/// Typed payload, tagged by the envelope `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum MessagePayload {
    /// Sign directives for the display to animate
    Signs(SignsPayload),
    /// Pipeline status mirror
    Status(StatusPayload),
    /// Live transcript for caption rendering
    Transcript(TranscriptPayload),
    /// Client announcement, sent once per established connection
    Config(ConfigPayload),
    /// Latency probe
    Ping(PingPayload),
    /// Probe echo; carries the originating ping's fields back
    Pong(PingPayload),
    /// Liveness beacon from the display
    Heartbeat(HeartbeatPayload),
    Subscribe(ChannelsPayload),
    Unsubscribe(ChannelsPayload),
    /// Delivery confirmation for a `requiresAck` envelope
    Ack(AckPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignsPayload {
    pub signs: Vec<SignDirective>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Full pipeline snapshot: state, counters, and recent stage errors
    pub status: PipelineStatusSnapshot,
    pub latency: LatencyStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    pub text: String,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    pub client_id: String,
    pub client_type: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub request_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsPayload {
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub message_id: String,
}

/// One wire frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
    /// Epoch milliseconds at creation
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_ack: Option<bool>,
}

impl WireMessage {
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            timestamp: now_ms(),
            requires_ack: None,
        }
    }

    /// Mark this message as requiring a delivery acknowledgement.
    pub fn with_ack(mut self) -> Self {
        self.requires_ack = Some(true);
        self
    }

    pub fn needs_ack(&self) -> bool {
        self.requires_ack == Some(true)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let msg = WireMessage::new(MessagePayload::Signs(SignsPayload {
            signs: vec![],
            text: "hello".to_string(),
        }));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"signs\""));
        assert!(json.contains("\"payload\""));
        assert!(json.contains("\"timestamp\""));
        // requiresAck is omitted unless set
        assert!(!json.contains("requiresAck"));

        let with_ack = msg.with_ack().to_json().unwrap();
        assert!(with_ack.contains("\"requiresAck\":true"));
    }

    #[test]
    fn test_transcript_final_keyword_on_the_wire() {
        let msg = WireMessage::new(MessagePayload::Transcript(TranscriptPayload {
            text: "hello there".to_string(),
            is_final: true,
            confidence: 0.92,
        }));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"final\":true"));
        assert!(!json.contains("isFinal"));

        let parsed = WireMessage::from_json(&json).unwrap();
        assert_eq!(parsed.payload, msg.payload);
    }

    #[test]
    fn test_status_carries_full_snapshot() {
        use signstream_types::{PipelineMetrics, PipelineState, StageError};

        let mut metrics = PipelineMetrics::default();
        metrics.transcriptions_received = 4;
        metrics.signs_generated = 9;
        let snapshot = PipelineStatusSnapshot {
            state: PipelineState::Streaming,
            metrics,
            recent_errors: vec![StageError::new(
                signstream_types::PipelineStage::Translation,
                "lexicon miss",
            )],
        };
        let msg = WireMessage::new(MessagePayload::Status(StatusPayload {
            status: snapshot,
            latency: LatencyStats::default(),
        }));

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"state\":\"streaming\""));
        assert!(json.contains("\"signsGenerated\":9"));
        assert!(json.contains("\"recentErrors\""));
        assert!(json.contains("lexicon miss"));

        let parsed = WireMessage::from_json(&json).unwrap();
        assert_eq!(parsed.payload, msg.payload);
    }

    #[test]
    fn test_ack_roundtrip() {
        let incoming = r#"{
            "id": "m-1",
            "type": "ack",
            "payload": { "messageId": "m-0" },
            "timestamp": 1700000000000
        }"#;
        let msg = WireMessage::from_json(incoming).unwrap();
        let MessagePayload::Ack(ack) = msg.payload else {
            panic!("expected ack payload");
        };
        assert_eq!(ack.message_id, "m-0");
    }

    #[test]
    fn test_subscribe_channels() {
        let msg = WireMessage::new(MessagePayload::Subscribe(ChannelsPayload {
            channels: vec!["signs".to_string(), "status".to_string()],
        }));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"subscribe\""));
        assert!(json.contains("\"channels\":[\"signs\",\"status\"]"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let incoming = r#"{
            "id": "m-1",
            "type": "telemetry",
            "payload": {},
            "timestamp": 1700000000000
        }"#;
        assert!(WireMessage::from_json(incoming).is_err());
    }
}
