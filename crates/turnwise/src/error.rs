use crate::denoise::DenoiseError;
use crate::metrics::Stage;
use crate::vad::VadError;

/// Invalid construction parameter. Raised only while building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}: {reason}")]
pub struct ConfigError {
    /// Name of the offending `PipelineConfig` field.
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Underlying failure of a single processing stage.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    #[error(transparent)]
    Vad(#[from] VadError),
    #[error(transparent)]
    Denoise(#[from] DenoiseError),
}

/// A VAD or denoise failure on one frame.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: StageFailure,
}

impl StageError {
    pub fn vad(err: VadError) -> Self {
        Self {
            stage: Stage::Vad,
            source: err.into(),
        }
    }

    pub fn denoise(err: DenoiseError) -> Self {
        Self {
            stage: Stage::Denoise,
            source: err.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },
    #[error("Pipeline is already processing a stream")]
    Concurrency,
    #[error("Stream cancelled")]
    Cancelled,
    #[error("Stream deadline exceeded")]
    DeadlineExceeded,
    #[error("Turn receiver dropped before the turn could be delivered")]
    TurnSinkClosed,
    #[error("Pipeline is closed")]
    Closed,
    #[error("Failed to release pipeline resources: {0}")]
    Close(String),
}

impl PipelineError {
    /// True for errors caused by the caller's cancellation or deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Stage a per-frame error belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage(err) => Some(err.stage),
            Self::FrameLength { .. } => Some(Stage::Input),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
