// job/orchestrator.rs
//
// The job state machine and the stage pipeline it drives:
// resolve -> preprocess -> vad -> asr -> diarization -> alignment ->
// postprocess -> quality. Cancellation is cooperative and observed at
// stage boundaries. ASR failures can fail the job; diarization failures
// only degrade it to a single default speaker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use uuid::Uuid;

use crate::alignment::{assign_speakers, assign_uniform_speaker, AlignmentConfig};
use crate::asr::{AsrAdapter, AsrOutput, AsrRequest, LoadContext, ModelSelector};
use crate::audio::{preprocess, CanonicalAudio};
use crate::config::{JobConfig, ModelTier, ResolvedConfig};
use crate::diarization::{DiarizationAdapter, DiarizationRequest, DEFAULT_SPEAKER};
use crate::error::{PipelineError, Result, Stage};
use crate::media::MediaResolver;
use crate::postprocess::{PostProcessor, PunctuationRestorer};
use crate::quality;
use crate::transcript::{speakers_from_segments, TranscriptSegment};
use crate::vad::{spans_or_full, Segmenter};

use super::events::TerminalEventSink;
use super::retry::{RetryDecision, RetryPolicy};
use super::store::JobStore;
use super::types::{Job, JobResult, JobState};

/// Per-stage wall-clock deadlines.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub asr: Duration,
    pub diarization: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            asr: Duration::from_secs(600),
            diarization: Duration::from_secs(300),
        }
    }
}

/// Everything the pipeline needs, injected once at startup.
pub struct PipelineContext {
    pub resolver: Arc<dyn MediaResolver>,
    pub asr: Arc<dyn AsrAdapter>,
    pub diarizer: Option<Arc<dyn DiarizationAdapter>>,
    pub punctuation: Option<Arc<dyn PunctuationRestorer>>,
    pub selector: Arc<dyn ModelSelector>,
    pub store: Arc<dyn JobStore>,
    pub events: Arc<dyn TerminalEventSink>,
    /// Serializes inference when workers share accelerators. Sized to the
    /// accelerator count, independent of the worker pool size. `None`
    /// means CPU-only, no serialization.
    pub accelerator: Option<Arc<Semaphore>>,
    pub timeouts: StageTimeouts,
    pub retry: RetryPolicy,
    pub alignment: AlignmentConfig,
}

struct JobEntry {
    job: Job,
    cancel: Arc<AtomicBool>,
}

/// How many finished jobs stay queryable through `status`. Past the cap
/// the oldest terminal entries are evicted; durable history is the
/// store's concern.
const MAX_FINISHED_JOBS: usize = 512;

/// Receiver half of the job queue, handed to the worker pool.
pub type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>;

pub struct Orchestrator {
    context: PipelineContext,
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    queue_tx: mpsc::UnboundedSender<Uuid>,
    running: AtomicUsize,
}

impl Orchestrator {
    pub fn new(context: PipelineContext) -> (Arc<Self>, JobQueue) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(Self {
            context,
            jobs: RwLock::new(HashMap::new()),
            queue_tx,
            running: AtomicUsize::new(0),
        });
        (orchestrator, Arc::new(Mutex::new(queue_rx)))
    }

    /// Validate and enqueue a new job. Validation failures reject the
    /// submission outright; no job state is created for them.
    pub async fn submit(&self, media_ref: impl Into<String>, config: JobConfig) -> Result<Uuid> {
        config.validate()?;

        let job = Job::new(media_ref.into(), config);
        let id = job.id;
        info!("Job {} submitted for '{}'", id, job.media_ref);

        self.persist_progress(&job).await;
        self.jobs.write().await.insert(
            id,
            JobEntry {
                job,
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );

        if self.queue_tx.send(id).is_err() {
            error!("Job queue closed, failing submission {}", id);
            self.jobs.write().await.remove(&id);
            return Err(PipelineError::internal(Stage::Submit, "job queue closed"));
        }
        Ok(id)
    }

    /// Request cancellation. A pending job is cancelled on the spot; a
    /// processing job observes the flag at its next stage boundary.
    pub async fn cancel(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::validation(format!("unknown job {job_id}")))?;

        match entry.job.state {
            JobState::Pending => {
                entry.job.advance(JobState::Cancelled);
                entry.job.completed_at = Some(Utc::now());
                let job = entry.job.clone();
                prune_finished(&mut jobs, MAX_FINISHED_JOBS);
                drop(jobs);
                info!("Job {} cancelled while pending", job_id);
                self.persist_progress(&job).await;
                self.context.events.on_job_terminal(job_id, JobState::Cancelled);
                Ok(())
            }
            JobState::Processing => {
                entry.cancel.store(true, Ordering::SeqCst);
                info!("Job {} flagged for cancellation", job_id);
                Ok(())
            }
            state => Err(PipelineError::validation(format!(
                "job {job_id} is already {state}"
            ))),
        }
    }

    /// Re-run a failed job from the start. Attempts and error are reset.
    pub async fn retry(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| PipelineError::validation(format!("unknown job {job_id}")))?;

        if entry.job.state != JobState::Failed {
            return Err(PipelineError::validation(format!(
                "job {job_id} is {}, only failed jobs can be retried",
                entry.job.state
            )));
        }

        entry.job.advance(JobState::Pending);
        entry.job.progress = 0;
        entry.job.error = None;
        entry.job.attempts = 0;
        entry.job.started_at = None;
        entry.job.completed_at = None;
        entry.cancel.store(false, Ordering::SeqCst);
        let job = entry.job.clone();
        drop(jobs);

        info!("Job {} reset for manual retry", job_id);
        self.persist_progress(&job).await;
        self.queue_tx
            .send(job_id)
            .map_err(|_| PipelineError::internal(Stage::Submit, "job queue closed"))
    }

    pub async fn status(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&job_id).map(|e| e.job.clone())
    }

    /// Drive one queued job to a terminal state or back into the queue.
    /// Called by the worker pool.
    pub async fn process(&self, job_id: Uuid) {
        let (config, media_ref, cancel, attempt) = {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else {
                warn!("Dequeued unknown job {}", job_id);
                return;
            };
            // Refused when cancelled while queued, or on a stale requeue.
            if !entry.job.advance(JobState::Processing) {
                return;
            }
            entry.job.attempts += 1;
            entry.job.started_at = Some(Utc::now());
            entry.job.error = None;
            (
                entry.job.config.clone(),
                entry.job.media_ref.clone(),
                entry.cancel.clone(),
                entry.job.attempts,
            )
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        let outcome = self.run_pipeline(job_id, &media_ref, &config, &cancel).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(result) => self.complete(job_id, result).await,
            Err(e) if e.is_cancelled() => self.mark_cancelled(job_id, e).await,
            Err(e) => self.fail_or_requeue(job_id, e, attempt).await,
        }
    }

    async fn run_pipeline(
        &self,
        job_id: Uuid,
        media_ref: &str,
        config: &JobConfig,
        cancel: &AtomicBool,
    ) -> Result<JobResult> {
        // Already validated at submit time.
        let resolved = config.validate()?;

        let path = self.context.resolver.resolve(media_ref).await?;
        self.update_progress(job_id, 10).await;
        check_cancel(cancel, Stage::Preprocess)?;

        let level = resolved.enhancement;
        let audio = tokio::task::spawn_blocking(move || preprocess(&path, level))
            .await
            .map_err(|e| PipelineError::internal(Stage::Preprocess, format!("preprocess task: {e}")))??;
        self.update_progress(job_id, 30).await;
        check_cancel(cancel, Stage::Vad)?;

        let spans = Segmenter::for_dialect(resolved.dialect).segment(&audio);
        let spans = spans_or_full(spans, audio.duration_seconds);
        self.update_progress(job_id, 40).await;
        check_cancel(cancel, Stage::Asr)?;

        let tier = self.context.selector.select(
            resolved.tier,
            resolved.pin_model_tier,
            &LoadContext {
                running_jobs: self.running.load(Ordering::SeqCst),
                input_duration_secs: audio.duration_seconds,
            },
        );

        let asr_output = self.run_asr(&audio, &spans, &resolved, config, tier).await?;
        self.update_progress(job_id, 70).await;
        check_cancel(cancel, Stage::Diarization)?;

        let segments = self.run_diarization(&audio, asr_output.segments, &resolved).await;
        self.update_progress(job_id, 90).await;
        check_cancel(cancel, Stage::Postprocess)?;

        let processor = PostProcessor::new(&config.glossary, resolved.dialect);
        let segments = processor.apply(segments, self.context.punctuation.as_deref());
        self.update_progress(job_id, 95).await;

        let metrics = quality::score(&segments, config.reference_transcript.as_deref());
        let speakers = speakers_from_segments(&segments);

        info!(
            "Job {} transcribed: {} segment(s), {} speaker(s), {:.2}s of audio",
            job_id,
            segments.len(),
            speakers.len(),
            audio.duration_seconds
        );

        Ok(JobResult {
            segments,
            speakers,
            metrics,
            detected_language: asr_output.detected_language,
        })
    }

    /// ASR under its deadline. A timeout gets one in-attempt retry at the
    /// next-smaller tier before the error propagates to the retry policy.
    async fn run_asr(
        &self,
        audio: &CanonicalAudio,
        spans: &[crate::transcript::SpeechSpan],
        resolved: &ResolvedConfig,
        config: &JobConfig,
        tier: ModelTier,
    ) -> Result<AsrOutput> {
        match self.asr_once(audio, spans, resolved, config, tier).await {
            Err(e) if e.kind == crate::error::ErrorKind::TranscriptionTimeout => {
                if let Some(smaller) = tier.smaller() {
                    warn!(
                        "ASR timed out on tier {}, retrying once with {}",
                        tier.code(),
                        smaller.code()
                    );
                    self.asr_once(audio, spans, resolved, config, smaller).await
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    async fn asr_once(
        &self,
        audio: &CanonicalAudio,
        spans: &[crate::transcript::SpeechSpan],
        resolved: &ResolvedConfig,
        config: &JobConfig,
        tier: ModelTier,
    ) -> Result<AsrOutput> {
        let request = AsrRequest {
            audio,
            spans,
            dialect: resolved.dialect,
            tier,
            hotwords: &config.custom_vocabulary,
        };
        let _permit = self.acquire_accelerator().await;
        tokio::time::timeout(self.context.timeouts.asr, self.context.asr.transcribe(request))
            .await
            .map_err(|_| {
                PipelineError::transcription_timeout(format!(
                    "deadline of {:?} exceeded on tier {}",
                    self.context.timeouts.asr,
                    tier.code()
                ))
            })?
    }

    /// Diarization is best-effort: any failure or timeout degrades to a
    /// single default speaker and the job continues.
    async fn run_diarization(
        &self,
        audio: &CanonicalAudio,
        segments: Vec<TranscriptSegment>,
        resolved: &ResolvedConfig,
    ) -> Vec<TranscriptSegment> {
        let diarizer = match (&self.context.diarizer, resolved.diarization) {
            (Some(diarizer), true) => diarizer,
            _ => return assign_uniform_speaker(segments, DEFAULT_SPEAKER),
        };

        let request = DiarizationRequest {
            audio,
            speaker_hint: resolved.speaker_count_hint,
        };
        let _permit = self.acquire_accelerator().await;
        let outcome =
            tokio::time::timeout(self.context.timeouts.diarization, diarizer.diarize(request)).await;

        match outcome {
            Ok(Ok(output)) => assign_speakers(segments, &output.turns, &self.context.alignment),
            Ok(Err(e)) => {
                warn!("Diarization failed, falling back to single speaker: {}", e);
                assign_uniform_speaker(segments, DEFAULT_SPEAKER)
            }
            Err(_) => {
                warn!(
                    "Diarization exceeded {:?}, falling back to single speaker",
                    self.context.timeouts.diarization
                );
                assign_uniform_speaker(segments, DEFAULT_SPEAKER)
            }
        }
    }

    async fn acquire_accelerator(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        match &self.context.accelerator {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        }
    }

    async fn complete(&self, job_id: Uuid, result: JobResult) {
        // The result write matters; give it one more chance before
        // failing the job over persistence.
        let mut saved = self.context.store.save_result(job_id, &result).await;
        if let Err(e) = &saved {
            warn!("Result save for {} failed, retrying once: {}", job_id, e);
            saved = self.context.store.save_result(job_id, &result).await;
        }
        if let Err(e) = saved {
            let error = PipelineError::internal(Stage::Quality, format!("result save: {e}"));
            self.fail(job_id, error).await;
            return;
        }

        let job = {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else { return };
            if !entry.job.advance(JobState::Completed) {
                warn!("Job {} is {}, dropping completion", job_id, entry.job.state);
                return;
            }
            entry.job.progress = 100;
            entry.job.completed_at = Some(Utc::now());
            let job = entry.job.clone();
            prune_finished(&mut jobs, MAX_FINISHED_JOBS);
            job
        };
        self.persist_progress(&job).await;
        self.context.events.on_job_terminal(job_id, JobState::Completed);
    }

    async fn mark_cancelled(&self, job_id: Uuid, error: PipelineError) {
        info!("Job {} cancelled: {}", job_id, error);
        let job = {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else { return };
            if !entry.job.advance(JobState::Cancelled) {
                return;
            }
            entry.job.completed_at = Some(Utc::now());
            let job = entry.job.clone();
            prune_finished(&mut jobs, MAX_FINISHED_JOBS);
            job
        };
        self.persist_progress(&job).await;
        self.context.events.on_job_terminal(job_id, JobState::Cancelled);
    }

    async fn fail_or_requeue(&self, job_id: Uuid, error: PipelineError, attempt: u32) {
        match self.context.retry.decide(&error, attempt) {
            RetryDecision::Requeue(delay) => {
                let job = {
                    let mut jobs = self.jobs.write().await;
                    let Some(entry) = jobs.get_mut(&job_id) else { return };
                    // Automatic retry: back to pending without firing a
                    // terminal event. The error stays visible on the job.
                    entry.job.advance(JobState::Pending);
                    entry.job.error = Some(error);
                    entry.job.clone()
                };
                self.persist_progress(&job).await;

                let queue_tx = self.queue_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if queue_tx.send(job_id).is_err() {
                        error!("Job queue closed, dropping requeue of {}", job_id);
                    }
                });
            }
            RetryDecision::Fail => self.fail(job_id, error).await,
        }
    }

    async fn fail(&self, job_id: Uuid, error: PipelineError) {
        error!("Job {} failed: {}", job_id, error);
        let job = {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else { return };
            if !entry.job.advance(JobState::Failed) {
                return;
            }
            entry.job.error = Some(error);
            entry.job.completed_at = Some(Utc::now());
            let job = entry.job.clone();
            prune_finished(&mut jobs, MAX_FINISHED_JOBS);
            job
        };
        self.persist_progress(&job).await;
        self.context.events.on_job_terminal(job_id, JobState::Failed);
    }

    async fn update_progress(&self, job_id: Uuid, progress: u8) {
        let job = {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else { return };
            entry.job.progress = progress;
            entry.job.clone()
        };
        self.persist_progress(&job).await;
    }

    /// Progress writes are advisory; a failing store logs and moves on.
    async fn persist_progress(&self, job: &Job) {
        if let Err(e) = self
            .context
            .store
            .save_progress(job.id, job.state, job.progress, job.error.as_ref())
            .await
        {
            warn!("Progress save for {} failed: {}", job.id, e);
        }
    }
}

fn check_cancel(cancel: &AtomicBool, stage: Stage) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        return Err(PipelineError::cancelled(stage));
    }
    Ok(())
}

/// Evict the oldest terminal entries once more than `max_finished` of
/// them accumulate. Pending and processing jobs are never touched.
fn prune_finished(jobs: &mut HashMap<Uuid, JobEntry>, max_finished: usize) {
    let mut finished: Vec<(Uuid, DateTime<Utc>)> = jobs
        .iter()
        .filter(|(_, entry)| entry.job.state.is_terminal())
        .map(|(id, entry)| (*id, entry.job.completed_at.unwrap_or(entry.job.created_at)))
        .collect();
    if finished.len() <= max_finished {
        return;
    }

    finished.sort_by_key(|(_, finished_at)| *finished_at);
    let excess = finished.len() - max_finished;
    for (id, _) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
    info!("Evicted {} finished job(s) from the registry", excess);
}
