use signstream_types::PipelineStage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} stage failure: {message}")]
    Stage {
        stage: PipelineStage,
        message: String,
        /// Assigned by the raising call site, never inferred.
        recoverable: bool,
    },

    #[error("transcript source error: {0}")]
    Source(String),

    #[error("translator error: {0}")]
    Translator(String),

    #[error("operation invalid in state {0}")]
    InvalidState(signstream_types::PipelineState),
}

impl PipelineError {
    pub fn stage(stage: PipelineStage, message: impl Into<String>, recoverable: bool) -> Self {
        PipelineError::Stage {
            stage,
            message: message.into(),
            recoverable,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
