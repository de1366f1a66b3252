//! Shared data model for the Signstream interpretation core
//!
//! This crate holds the types that cross crate boundaries: transcript
//! segments coming out of the speech layer, sign directives going into the
//! animation layer, pipeline and connection state enums, and the metrics
//! models (bounded latency history, error ring, connection quality).
//!
//! Everything here is plain data, no I/O and no timers. The pipeline and
//! relay crates own the behavior.

pub mod error;
pub mod metrics;
pub mod signs;
pub mod state;
pub mod transcript;

// Re-exports
pub use error::{ErrorRing, PipelineStage, StageError};
pub use metrics::{
    ConnectionMetrics, LatencyHistory, LatencyStats, PipelineMetrics, PipelineStatusSnapshot,
};
pub use signs::{SignDirective, Translation};
pub use state::{ConnectionQuality, ConnectionState, PipelineState};
pub use transcript::TranscriptSegment;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Wire messages and error records carry this representation so that
/// browser peers can compare timestamps directly.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
