// lib.rs
//
// Arabic-dialect speech transcription pipeline: job orchestration over a
// staged flow of audio preprocessing, voice activity detection, speech
// recognition, speaker diarization, transcript alignment, deterministic
// post-processing and quality scoring.
//
// Heavy inference backends are feature-gated: `whisper` enables the
// whisper.cpp recognizer, `pyannote` the onnx diarizer. The core builds
// without either; adapters are injected through traits.

pub mod alignment;
pub mod asr;
pub mod audio;
pub mod config;
pub mod diarization;
pub mod error;
pub mod job;
pub mod media;
pub mod model_cache;
pub mod postprocess;
pub mod quality;
pub mod transcript;
pub mod vad;

pub use config::{Dialect, EnhancementLevel, GlossaryEntry, JobConfig, ModelTier, ResolvedConfig};
pub use error::{ErrorKind, PipelineError, Result, Stage};
pub use job::{
    Job, JobQueue, JobResult, JobState, JobStore, MemoryJobStore, Orchestrator, PipelineContext,
    RetryPolicy, StageTimeouts, WorkerPool,
};
pub use model_cache::{ModelCache, ModelKind};
pub use transcript::{
    QualityMetrics, Speaker, SpeakerTurn, SpeechSpan, TranscriptSegment, Word, WordErrorCounts,
};

/// Initialize env_logger once for binaries and examples. `RUST_LOG`
/// overrides the default `info` level.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
