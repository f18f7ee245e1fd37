// job/worker.rs
//
// Fixed-size worker pool draining the job queue. Workers share one
// receiver behind a mutex; each takes the next job id and drives it
// through the orchestrator. The pool winds down when the queue closes.

use std::sync::Arc;

use log::{debug, info};
use tokio::task::JoinHandle;

use super::orchestrator::{JobQueue, Orchestrator};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(orchestrator: Arc<Orchestrator>, queue: JobQueue, workers: usize) -> Self {
        let workers = workers.max(1);
        info!("Starting {} transcription worker(s)", workers);

        let handles = (0..workers)
            .map(|worker_id| {
                let orchestrator = orchestrator.clone();
                let queue = queue.clone();
                tokio::spawn(async move {
                    loop {
                        let job_id = { queue.lock().await.recv().await };
                        match job_id {
                            Some(job_id) => {
                                debug!("Worker {} picked up job {}", worker_id, job_id);
                                orchestrator.process(job_id).await;
                            }
                            None => {
                                debug!("Worker {} shutting down, queue closed", worker_id);
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        Self { handles }
    }

    /// Wait for all workers to exit. Returns once the queue sender side
    /// has been dropped and the backlog is drained.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
