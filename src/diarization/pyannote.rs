// diarization/pyannote.rs
//
// pyannote-rs engine behind the `pyannote` feature: onnx segmentation
// followed by speaker-embedding clustering. The segmentation model slices
// the audio into speech chunks, each chunk's embedding is matched against
// known speakers and a new speaker is opened when nothing matches.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use pyannote_rs::{get_segments, EmbeddingExtractor, EmbeddingManager};
use tokio::sync::Mutex;

use crate::error::{PipelineError, Result, Stage};
use crate::transcript::SpeakerTurn;

use super::{DiarizationAdapter, DiarizationOutput, DiarizationRequest};

const DEFAULT_MAX_SPEAKERS: usize = 10;
// Higher threshold means fewer false speaker splits.
const SIMILARITY_THRESHOLD: f32 = 0.85;

pub struct PyannoteDiarizer {
    segmentation_model: PathBuf,
    embedding_model: PathBuf,
    // EmbeddingExtractor holds an onnx session and is not Sync.
    extractor: Mutex<EmbeddingExtractor>,
}

impl PyannoteDiarizer {
    pub fn new(segmentation_model: PathBuf, embedding_model: PathBuf) -> Result<Arc<Self>> {
        if !segmentation_model.exists() {
            return Err(PipelineError::model_load(
                Stage::Diarization,
                format!("segmentation model not found: {}", segmentation_model.display()),
            ));
        }
        if !embedding_model.exists() {
            return Err(PipelineError::model_load(
                Stage::Diarization,
                format!("embedding model not found: {}", embedding_model.display()),
            ));
        }

        let extractor = EmbeddingExtractor::new(&embedding_model).map_err(|e| {
            PipelineError::model_load(Stage::Diarization, format!("embedding extractor: {e}"))
        })?;

        info!(
            "Diarizer ready (segmentation: {}, embeddings: {})",
            segmentation_model.display(),
            embedding_model.display()
        );

        Ok(Arc::new(Self {
            segmentation_model,
            embedding_model,
            extractor: Mutex::new(extractor),
        }))
    }
}

#[async_trait]
impl DiarizationAdapter for PyannoteDiarizer {
    async fn diarize(&self, request: DiarizationRequest<'_>) -> Result<DiarizationOutput> {
        let max_speakers = request
            .speaker_hint
            .map(|hint| hint.min(DEFAULT_MAX_SPEAKERS))
            .unwrap_or(DEFAULT_MAX_SPEAKERS);

        // pyannote-rs consumes i16 samples.
        let samples_i16: Vec<i16> = request
            .audio
            .samples
            .iter()
            .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
            .collect();
        let sample_rate = request.audio.sample_rate;
        let segmentation_model = self.segmentation_model.clone();

        let mut extractor = self.extractor.lock().await;
        let mut manager = EmbeddingManager::new(max_speakers);

        let segments = get_segments(&samples_i16, sample_rate, &segmentation_model)
            .map_err(|e| {
                PipelineError::internal(Stage::Diarization, format!("segmentation: {e}"))
            })?;

        let mut turns: Vec<SpeakerTurn> = Vec::new();
        for segment in segments {
            let segment = match segment {
                Ok(segment) => segment,
                Err(e) => {
                    warn!("Skipping unreadable diarization segment: {}", e);
                    continue;
                }
            };

            let embedding: Vec<f32> = match extractor.compute(&segment.samples) {
                Ok(iter) => iter.collect(),
                Err(e) => {
                    warn!(
                        "Skipping segment at {:.2}s, embedding failed: {}",
                        segment.start, e
                    );
                    continue;
                }
            };

            let speaker_label = match manager.search_speaker(embedding, SIMILARITY_THRESHOLD) {
                Some(idx) => format!("speaker_{idx}"),
                None => {
                    // Capacity reached; lump the rest into the last slot.
                    format!("speaker_{}", max_speakers.saturating_sub(1))
                }
            };

            turns.push(SpeakerTurn {
                start: segment.start,
                end: segment.end,
                speaker_label,
            });
        }

        turns.sort_by(|a, b| a.start.total_cmp(&b.start));

        let output = DiarizationOutput { turns };
        info!(
            "Diarization found {} turn(s), {} speaker(s)",
            output.turns.len(),
            output.speaker_labels().len()
        );
        Ok(output)
    }
}

impl std::fmt::Debug for PyannoteDiarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyannoteDiarizer")
            .field("segmentation_model", &self.segmentation_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}
