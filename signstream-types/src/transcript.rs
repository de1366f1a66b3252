//! Transcript segments emitted by the speech recognition collaborator

use serde::{Deserialize, Serialize};

/// One segment of recognized speech.
///
/// Segments are append-only within a session: an interim segment is
/// superseded by later segments, never mutated in place. Only segments
/// with `is_final == true` enter the translation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    /// Recognizer-assigned segment id
    pub id: String,

    /// Recognized text
    pub text: String,

    /// Segment start offset in the audio stream (ms)
    pub start_time: f64,

    /// Segment end offset in the audio stream (ms)
    pub end_time: f64,

    /// Recognizer confidence, 0.0..=1.0
    pub confidence: f32,

    /// Whether the recognizer has finalized this segment
    pub is_final: bool,
}

impl TranscriptSegment {
    /// Create a finalized segment (interim results use `interim`).
    pub fn final_text(id: impl Into<String>, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            start_time: 0.0,
            end_time: 0.0,
            confidence,
            is_final: true,
        }
    }

    /// Create an interim (not yet finalized) segment.
    pub fn interim(id: impl Into<String>, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_final: false,
            ..Self::final_text(id, text, confidence)
        }
    }

    /// Number of whitespace-separated words in this segment.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
