// error.rs
//
// Error taxonomy for the transcription pipeline. Every failure that can
// reach a job is a `PipelineError` carrying its kind, the stage that
// raised it and a human-readable message. Retryability is a property of
// the kind, consulted by the retry logic in `job::retry`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage names, used for error attribution and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Submit,
    Preprocess,
    Vad,
    Asr,
    Diarization,
    Alignment,
    Postprocess,
    Quality,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Submit => "submit",
            Stage::Preprocess => "preprocess",
            Stage::Vad => "vad",
            Stage::Asr => "asr",
            Stage::Diarization => "diarization",
            Stage::Alignment => "alignment",
            Stage::Postprocess => "postprocess",
            Stage::Quality => "quality",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification. Decides whether a job attempt can be retried,
/// must fail permanently, or is merely downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad job configuration (unknown dialect, tier, ...). No job is created.
    Validation,
    /// Container/codec could not be decoded.
    UnsupportedFormat,
    /// Decode produced zero-length output.
    CorruptMedia,
    /// Model artifact missing or corrupt. Retryable a bounded number of times.
    ModelLoad,
    /// ASR exceeded its deadline. Retryable with a smaller tier first.
    TranscriptionTimeout,
    /// Diarization exceeded its deadline. Downgraded, never fails the job.
    DiarizationTimeout,
    /// Cooperative cancellation observed at a stage boundary. Terminal, not an error.
    Cancelled,
    /// Anything else: adapter bugs, I/O surprises. Fatal.
    Internal,
}

impl ErrorKind {
    /// Whether a job attempt that failed with this kind may be rescheduled.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ModelLoad | ErrorKind::TranscriptionTimeout | ErrorKind::DiarizationTimeout
        )
    }
}

/// Structured error attached to a failed job: `{kind, message, stage}`.
/// The external API layer translates this into user-facing text.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{stage}] {kind:?}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, Stage::Submit, message)
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, Stage::Preprocess, message)
    }

    pub fn corrupt_media(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptMedia, Stage::Preprocess, message)
    }

    pub fn model_load(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelLoad, stage, message)
    }

    pub fn transcription_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TranscriptionTimeout, Stage::Asr, message)
    }

    pub fn diarization_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DiarizationTimeout, Stage::Diarization, message)
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(ErrorKind::Cancelled, stage, "cancelled at stage boundary")
    }

    pub fn internal(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, stage, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
