//! Real-time interpretation pipeline
//!
//! Orchestrates the flow from live transcript segments to sign-language
//! animation directives: a validated lifecycle state machine, a batching
//! scheduler with dual flush triggers, an adaptive latency controller and
//! a circuit breaker for cascading failures. The speech engine and the
//! sign renderer are injected collaborators; this crate owns everything
//! between them.

pub mod batcher;
pub mod breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod latency;
pub mod pipeline;
pub mod source;
pub mod translator;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use events::{EventBus, PipelineEvent};
pub use pipeline::SignPipeline;
pub use source::{ChannelSource, SegmentSender, SourceFactory, TranscriptSource};
pub use translator::{GlossTranslator, SignTranslator};
