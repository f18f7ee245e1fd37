// job/events.rs
//
// Terminal-event notification seam. The orchestrator fires exactly one
// event when a job reaches a terminal state; deployments hook webhooks or
// message buses in here. The default sink just logs.

use log::info;
use uuid::Uuid;

use super::types::JobState;

pub trait TerminalEventSink: Send + Sync {
    fn on_job_terminal(&self, job_id: Uuid, state: JobState);
}

/// Default sink: one structured log line per finished job.
pub struct LogEventSink;

impl TerminalEventSink for LogEventSink {
    fn on_job_terminal(&self, job_id: Uuid, state: JobState) {
        info!("Job {} reached terminal state: {}", job_id, state);
    }
}
