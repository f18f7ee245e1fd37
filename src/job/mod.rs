// job/mod.rs
//
// Job orchestration: lifecycle types, persistence and event seams, retry
// policy, the stage pipeline and the worker pool that drives it.
//
// Module structure:
// - types.rs: job lifecycle state machine and result types
// - store.rs: progress/result persistence seam
// - events.rs: terminal-event notification seam
// - retry.rs: bounded exponential backoff for transient failures
// - orchestrator.rs: submit/cancel/retry/status and the stage pipeline
// - worker.rs: fixed-size worker pool over the job queue

pub mod events;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod types;
pub mod worker;

pub use events::{LogEventSink, TerminalEventSink};
pub use orchestrator::{JobQueue, Orchestrator, PipelineContext, StageTimeouts};
pub use retry::{RetryDecision, RetryPolicy};
pub use store::{JobStore, MemoryJobStore};
pub use types::{Job, JobResult, JobState};
pub use worker::WorkerPool;
