// job/store.rs
//
// Persistence seam for job progress and results. The orchestrator writes
// through this trait after every state change; deployments back it with
// their own storage. Progress writes are advisory, result writes are not.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

use super::types::{JobResult, JobState};

/// Last persisted view of one job's lifecycle.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub state: JobState,
    pub progress: u8,
    pub error: Option<PipelineError>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_progress(
        &self,
        job_id: Uuid,
        state: JobState,
        progress: u8,
        error: Option<&PipelineError>,
    ) -> Result<()>;

    async fn save_result(&self, job_id: Uuid, result: &JobResult) -> Result<()>;
}

/// In-memory store used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryJobStore {
    progress: RwLock<HashMap<Uuid, ProgressRecord>>,
    results: RwLock<HashMap<Uuid, JobResult>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn progress(&self, job_id: Uuid) -> Option<ProgressRecord> {
        self.progress.read().await.get(&job_id).cloned()
    }

    pub async fn result(&self, job_id: Uuid) -> Option<JobResult> {
        self.results.read().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save_progress(
        &self,
        job_id: Uuid,
        state: JobState,
        progress: u8,
        error: Option<&PipelineError>,
    ) -> Result<()> {
        debug!("Persisting {} at {}% ({})", job_id, progress, state);
        self.progress.write().await.insert(
            job_id,
            ProgressRecord {
                state,
                progress,
                error: error.cloned(),
            },
        );
        Ok(())
    }

    async fn save_result(&self, job_id: Uuid, result: &JobResult) -> Result<()> {
        self.results.write().await.insert(job_id, result.clone());
        Ok(())
    }
}
