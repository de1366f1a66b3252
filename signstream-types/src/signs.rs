//! Sign directives and translations produced by the translator

use serde::{Deserialize, Serialize};

/// One unit of animation instruction for the avatar layer.
///
/// Produced only by the sign translator; consumed read-only by renderers
/// and remote display surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDirective {
    /// Canonical uppercase label for the sign (e.g. `HELLO`)
    pub gloss: String,

    /// How long the sign animation should run (ms)
    pub duration_ms: u64,

    /// Handshape identifier
    pub handshape: String,

    /// Signing-space location identifier
    pub location: String,

    /// Movement pattern identifier
    pub movement: String,

    /// Non-manual markers (eyebrows, mouth morphemes, head tilt, ...)
    #[serde(default)]
    pub non_manual_markers: Vec<String>,
}

/// One translated batch: the source text and its ordered sign sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    /// Unique id for this batch
    pub id: String,

    /// The batched source text, as buffered (normalized, space-joined)
    pub source_text: String,

    /// Ordered sign directives for the whole batch
    pub signs: Vec<SignDirective>,

    /// Completion time (ms since epoch)
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_serialization() {
        let directive = SignDirective {
            gloss: "HELLO".to_string(),
            duration_ms: 800,
            handshape: "open-b".to_string(),
            location: "forehead".to_string(),
            movement: "arc-out".to_string(),
            non_manual_markers: vec!["smile".to_string()],
        };
        let json = serde_json::to_string(&directive).unwrap();
        assert!(json.contains("\"gloss\":\"HELLO\""));
        assert!(json.contains("\"durationMs\":800"));
        assert!(json.contains("\"nonManualMarkers\":[\"smile\"]"));
    }

    #[test]
    fn test_directive_markers_default_to_empty() {
        let json = r#"{"gloss":"A","durationMs":300,"handshape":"a","location":"neutral","movement":"hold"}"#;
        let directive: SignDirective = serde_json::from_str(json).unwrap();
        assert!(directive.non_manual_markers.is_empty());
    }
}
