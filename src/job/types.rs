// job/types.rs
//
// Job lifecycle types. The state machine is strict: the only legal
// transitions are the ones `JobState::can_transition_to` admits, and the
// orchestrator refuses anything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JobConfig;
use crate::error::PipelineError;
use crate::transcript::{QualityMetrics, Speaker, TranscriptSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// Legal lifecycle moves. Pending is re-entered two ways: an
    /// automatic requeue of a retryable failure (from Processing) and a
    /// manual retry (from Failed, the one arrow out of a terminal state).
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Processing, Pending)
                | (Failed, Pending)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One transcription job as tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub media_ref: String,
    pub config: JobConfig,
    pub state: JobState,
    /// Coarse stage progress, 0..=100.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    /// Processing attempts so far, including the current one.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(media_ref: String, config: JobConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_ref,
            config,
            state: JobState::Pending,
            progress: 0,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a lifecycle move, refusing anything the state machine does
    /// not admit. Returns whether the state changed.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

/// Durable output of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub segments: Vec<TranscriptSegment>,
    pub speakers: Vec<Speaker>,
    pub metrics: QualityMetrics,
    pub detected_language: String,
}
