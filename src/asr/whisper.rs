// asr/whisper.rs
//
// whisper.cpp engine behind the `whisper` feature. Models are ggml
// checkpoints on disk, one per tier; loaded contexts live in the shared
// model cache. Inference is blocking and runs on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::CANONICAL_SAMPLE_RATE;
use crate::config::ModelTier;
use crate::error::{PipelineError, Result, Stage};
use crate::model_cache::{ModelCache, ModelKind};
use crate::transcript::{SpeechSpan, TranscriptSegment, Word};

use super::cleanup::clean_decoder_output;
use super::{
    confidence_from_logprob, needs_temperature_fallback, AsrAdapter, AsrOutput, AsrRequest,
    DecodeParams, DecodeQuality,
};

/// whisper.cpp refuses inputs shorter than a second; short spans are
/// padded with trailing silence.
const MIN_DECODE_SECS: f64 = 1.2;

pub struct WhisperAsrEngine {
    models_dir: PathBuf,
    cache: Arc<ModelCache>,
    threads: i32,
}

impl WhisperAsrEngine {
    pub fn new(models_dir: PathBuf, cache: Arc<ModelCache>) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(4) as i32;
        Self {
            models_dir,
            cache,
            threads,
        }
    }

    fn model_path(&self, tier: ModelTier) -> PathBuf {
        self.models_dir.join(format!("ggml-{}.bin", tier.code()))
    }

    async fn context(&self, tier: ModelTier) -> Result<Arc<WhisperContext>> {
        let path = self.model_path(tier);
        self.cache
            .get_or_load(ModelKind::Asr, tier, || {
                if !path.exists() {
                    return Err(PipelineError::model_load(
                        Stage::Asr,
                        format!("model checkpoint not found: {}", path.display()),
                    ));
                }
                info!("Loading whisper model from {}", path.display());
                let path_str = path.to_string_lossy().into_owned();
                let context =
                    WhisperContext::new_with_params(&path_str, WhisperContextParameters::default())
                        .map_err(|e| {
                            PipelineError::model_load(Stage::Asr, format!("whisper init: {e}"))
                        })?;
                Ok(Arc::new(context))
            })
            .await
    }
}

#[async_trait]
impl AsrAdapter for WhisperAsrEngine {
    async fn transcribe(&self, request: AsrRequest<'_>) -> Result<AsrOutput> {
        let context = self.context(request.tier).await?;
        let params = DecodeParams::new(request.dialect, request.hotwords);
        let threads = self.threads;

        // Slice out the speech spans up front so the blocking task owns
        // everything it touches.
        let min_samples = (MIN_DECODE_SECS * CANONICAL_SAMPLE_RATE as f64) as usize;
        let slices: Vec<(SpeechSpan, Vec<f32>)> = request
            .spans
            .iter()
            .map(|span| {
                let mut samples = request.audio.slice_seconds(span.start, span.end).to_vec();
                if samples.len() < min_samples {
                    samples.resize(min_samples, 0.0);
                }
                (*span, samples)
            })
            .collect();

        let segments = tokio::task::spawn_blocking(move || {
            decode_spans(&context, &params, threads, &slices)
        })
        .await
        .map_err(|e| PipelineError::internal(Stage::Asr, format!("decode task: {e}")))??;

        info!(
            "ASR produced {} segment(s) from {} span(s)",
            segments.len(),
            request.spans.len()
        );

        Ok(AsrOutput {
            segments,
            detected_language: "ar".to_string(),
            language_confidence: 1.0,
        })
    }
}

fn decode_spans(
    context: &WhisperContext,
    params: &DecodeParams,
    threads: i32,
    slices: &[(SpeechSpan, Vec<f32>)],
) -> Result<Vec<TranscriptSegment>> {
    let mut segments = Vec::new();
    let mut next_id = 0u32;

    for (span, samples) in slices {
        let mut decoded = decode_once(context, params, params.temperature, threads, samples)?;

        if needs_temperature_fallback(decoded.quality, params) {
            debug!(
                "Temperature fallback at {:.2}s (logprob {:.2}, compression {:.2})",
                span.start, decoded.quality.avg_logprob, decoded.quality.compression_ratio
            );
            decoded = decode_once(context, params, params.fallback_temperature, threads, samples)?;
        }

        for raw in decoded.segments {
            let text = clean_decoder_output(&raw.text);
            if text.is_empty() {
                continue;
            }
            let start = span.start + raw.start;
            let end = span.start + raw.end;
            if end <= start {
                continue;
            }
            segments.push(TranscriptSegment {
                id: next_id,
                start,
                end,
                text,
                confidence: raw.confidence,
                speaker_id: None,
                words: raw
                    .words
                    .into_iter()
                    .map(|w| Word {
                        text: w.text,
                        start: span.start + w.start,
                        end: span.start + w.end,
                        confidence: w.confidence,
                    })
                    .collect(),
            });
            next_id += 1;
        }
    }

    Ok(segments)
}

struct RawWord {
    text: String,
    start: f64,
    end: f64,
    confidence: f32,
}

struct RawSegment {
    text: String,
    start: f64,
    end: f64,
    confidence: f32,
    words: Vec<RawWord>,
}

struct DecodePass {
    segments: Vec<RawSegment>,
    quality: DecodeQuality,
}

fn decode_once(
    context: &WhisperContext,
    params: &DecodeParams,
    temperature: f32,
    threads: i32,
    samples: &[f32],
) -> Result<DecodePass> {
    let mut full = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: 5,
        patience: 1.0,
    });
    full.set_language(Some("ar"));
    full.set_translate(false);
    full.set_initial_prompt(&params.initial_prompt);
    full.set_token_timestamps(true);
    full.set_print_special(false);
    full.set_print_progress(false);
    full.set_print_realtime(false);
    full.set_print_timestamps(false);
    full.set_suppress_blank(true);
    full.set_suppress_non_speech_tokens(true);
    full.set_temperature(temperature);
    full.set_max_initial_ts(1.0);
    full.set_entropy_thold(2.4);
    full.set_logprob_thold(params.logprob_threshold);
    full.set_no_speech_thold(0.55);
    full.set_single_segment(false);
    full.set_no_context(true);
    full.set_n_threads(threads);

    let mut state = context
        .create_state()
        .map_err(|e| PipelineError::internal(Stage::Asr, format!("whisper state: {e}")))?;
    state
        .full(full, samples)
        .map_err(|e| PipelineError::internal(Stage::Asr, format!("whisper decode: {e}")))?;

    let n_segments = state
        .full_n_segments()
        .map_err(|e| PipelineError::internal(Stage::Asr, format!("segment count: {e}")))?;

    let mut segments = Vec::with_capacity(n_segments as usize);
    let mut logprob_sum = 0.0f32;
    let mut token_total = 0usize;
    let mut all_words: Vec<String> = Vec::new();

    for i in 0..n_segments {
        let text = match state.full_get_segment_text_lossy(i) {
            Ok(text) => text,
            Err(_) => continue,
        };
        let start = state.full_get_segment_t0(i).unwrap_or(0) as f64 / 100.0;
        let end = state.full_get_segment_t1(i).unwrap_or(0) as f64 / 100.0;

        let mut words: Vec<RawWord> = Vec::new();
        let mut seg_logprob = 0.0f32;
        let mut seg_tokens = 0usize;

        let n_tokens = state.full_n_tokens(i).unwrap_or(0);
        for t in 0..n_tokens {
            let token = match state.full_get_token_data(i, t) {
                Ok(token) => token,
                Err(_) => continue,
            };
            let piece = match context.token_to_str(token.id) {
                Ok(piece) => piece.to_string(),
                Err(_) => continue,
            };
            // Special tokens render as bracketed markers.
            if piece.starts_with("[_") || piece.starts_with("<|") {
                continue;
            }

            seg_logprob += token.plog;
            seg_tokens += 1;

            let token_start = token.t0 as f64 / 100.0;
            let token_end = token.t1 as f64 / 100.0;
            let opens_word = piece.starts_with(' ') || words.is_empty();
            if opens_word {
                words.push(RawWord {
                    text: piece.trim_start().to_string(),
                    start: token_start,
                    end: token_end,
                    confidence: token.p,
                });
            } else if let Some(last) = words.last_mut() {
                last.text.push_str(&piece);
                last.end = token_end;
                last.confidence = last.confidence.min(token.p);
            }
        }
        words.retain(|w| !w.text.is_empty());

        logprob_sum += seg_logprob;
        token_total += seg_tokens;
        all_words.extend(text.split_whitespace().map(|w| w.to_string()));

        let avg = if seg_tokens > 0 {
            seg_logprob / seg_tokens as f32
        } else {
            params.logprob_threshold
        };
        segments.push(RawSegment {
            text,
            start,
            end,
            confidence: confidence_from_logprob(avg),
            words,
        });
    }

    let avg_logprob = if token_total > 0 {
        logprob_sum / token_total as f32
    } else {
        0.0
    };

    if temperature > 0.0 {
        warn!(
            "Decoded at fallback temperature {:.1} ({} segment(s))",
            temperature,
            segments.len()
        );
    }

    Ok(DecodePass {
        quality: DecodeQuality {
            avg_logprob,
            compression_ratio: approx_compression_ratio(&all_words),
        },
        segments,
    })
}

/// Unique-word proxy for the text compression ratio: a decode stuck in a
/// loop repeats a small vocabulary many times.
fn approx_compression_ratio(words: &[String]) -> f32 {
    if words.is_empty() {
        return 1.0;
    }
    let unique: std::collections::HashSet<&str> = words.iter().map(|w| w.as_str()).collect();
    words.len() as f32 / unique.len() as f32
}
