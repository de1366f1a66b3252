//! Pipeline stage taxonomy and the bounded error ring

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many errors the ring retains before dropping the oldest.
pub const ERROR_RING_CAPACITY: usize = 10;

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Audio,
    Speech,
    Translation,
    Rendering,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::Audio => "audio",
            PipelineStage::Speech => "speech",
            PipelineStage::Translation => "translation",
            PipelineStage::Rendering => "rendering",
        };
        write!(f, "{}", s)
    }
}

/// One recorded stage failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageError {
    pub stage: PipelineStage,
    pub message: String,

    /// When the error was recorded (ms since epoch)
    pub timestamp: i64,
}

impl StageError {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            timestamp: crate::now_ms(),
        }
    }
}

/// Bounded ring of the most recent stage errors, oldest dropped first.
#[derive(Debug, Clone, Default)]
pub struct ErrorRing {
    entries: VecDeque<StageError>,
}

impl ErrorRing {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(ERROR_RING_CAPACITY),
        }
    }

    /// Append an error, evicting the oldest entry when full.
    pub fn push(&mut self, error: StageError) {
        if self.entries.len() == ERROR_RING_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(error);
    }

    /// Snapshot of the ring, oldest first.
    pub fn snapshot(&self) -> Vec<StageError> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_drops_oldest_first() {
        let mut ring = ErrorRing::new();
        for i in 0..12 {
            ring.push(StageError::new(PipelineStage::Speech, format!("err {}", i)));
        }
        assert_eq!(ring.len(), ERROR_RING_CAPACITY);

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.first().unwrap().message, "err 2");
        assert_eq!(snapshot.last().unwrap().message, "err 11");
    }

    #[test]
    fn test_stage_serialization() {
        let err = StageError::new(PipelineStage::Translation, "lookup failed");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"stage\":\"translation\""));
        assert!(json.contains("\"timestamp\""));
    }
}
