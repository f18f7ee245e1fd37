// asr/mod.rs
//
// ASR adapter contract and the dialect-aware decoding parameters shared
// by implementations. The pipeline only depends on the `AsrAdapter`
// trait; the whisper-rs engine lives behind the `whisper` feature.
//
// Module structure:
// - selector.rs: model-tier selection strategy
// - cleanup.rs: decoder-output repetition cleanup
// - whisper.rs: whisper-rs engine (feature "whisper")

pub mod cleanup;
pub mod selector;
#[cfg(feature = "whisper")]
pub mod whisper;

use async_trait::async_trait;

use crate::audio::CanonicalAudio;
use crate::config::{Dialect, ModelTier};
use crate::error::Result;
use crate::transcript::{SpeechSpan, TranscriptSegment};

pub use selector::{FixedSelector, LoadAwareSelector, LoadContext, ModelSelector};

/// One recognition request over canonical audio, restricted to the given
/// speech spans (callers substitute a full-buffer span when VAD found
/// nothing).
pub struct AsrRequest<'a> {
    pub audio: &'a CanonicalAudio,
    pub spans: &'a [SpeechSpan],
    pub dialect: Dialect,
    pub tier: ModelTier,
    pub hotwords: &'a [String],
}

/// Recognition result: ordered segments with speakers unset.
#[derive(Debug, Clone)]
pub struct AsrOutput {
    pub segments: Vec<TranscriptSegment>,
    pub detected_language: String,
    pub language_confidence: f32,
}

/// Speech recognition seam. Implementations are expected to be blocking
/// internally (model inference) and wrapped in `spawn_blocking`; the
/// orchestrator applies the per-stage deadline around this call.
#[async_trait]
pub trait AsrAdapter: Send + Sync {
    async fn transcribe(&self, request: AsrRequest<'_>) -> Result<AsrOutput>;
}

/// Dialect-aware decoding parameters.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Initial textual prompt biasing the decoder toward Arabic script
    /// and the requested dialect register. Hotword hints are appended.
    pub initial_prompt: String,
    /// Deterministic by default.
    pub temperature: f32,
    /// Single fallback rung against repetition loops on noisy audio.
    pub fallback_temperature: f32,
    /// Compression ratio above this marks a pathological decode.
    pub compression_ratio_threshold: f32,
    /// Average log-probability below this marks a pathological decode.
    pub logprob_threshold: f32,
}

impl DecodeParams {
    pub fn new(dialect: Dialect, hotwords: &[String]) -> Self {
        let mut initial_prompt = dialect.initial_prompt().to_string();
        if !hotwords.is_empty() {
            // Vocabulary hints bias token probabilities without
            // guaranteeing verbatim output.
            initial_prompt.push_str(" مصطلحات مهمة: ");
            initial_prompt.push_str(&hotwords.join("، "));
            initial_prompt.push('.');
        }

        Self {
            initial_prompt,
            temperature: 0.0,
            fallback_temperature: 0.4,
            compression_ratio_threshold: 2.4,
            logprob_threshold: -1.0,
        }
    }
}

/// Decoder self-reported quality for one pass, used to trigger the
/// temperature fallback.
#[derive(Debug, Clone, Copy)]
pub struct DecodeQuality {
    pub avg_logprob: f32,
    pub compression_ratio: f32,
}

/// A pathological compression ratio or near-zero log-probability signals
/// a repetition loop; retry once at the fallback temperature.
pub fn needs_temperature_fallback(quality: DecodeQuality, params: &DecodeParams) -> bool {
    quality.compression_ratio > params.compression_ratio_threshold
        || quality.avg_logprob < params.logprob_threshold
}

/// Map an average token log-probability monotonically into [0, 1].
pub fn confidence_from_logprob(avg_logprob: f32) -> f32 {
    avg_logprob.min(0.0).exp().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_dialect_and_hotwords() {
        let hotwords = vec!["البتروكيماويات".to_string(), "الأنبار".to_string()];
        let params = DecodeParams::new(Dialect::Iraqi, &hotwords);
        assert!(params.initial_prompt.contains("العراقية"));
        assert!(params.initial_prompt.contains("البتروكيماويات"));
        assert_eq!(params.temperature, 0.0);
    }

    #[test]
    fn fallback_triggers_on_compression_or_logprob() {
        let params = DecodeParams::new(Dialect::Msa, &[]);
        let healthy = DecodeQuality {
            avg_logprob: -0.3,
            compression_ratio: 1.6,
        };
        assert!(!needs_temperature_fallback(healthy, &params));

        let looping = DecodeQuality {
            avg_logprob: -0.3,
            compression_ratio: 3.1,
        };
        assert!(needs_temperature_fallback(looping, &params));

        let hopeless = DecodeQuality {
            avg_logprob: -1.8,
            compression_ratio: 1.6,
        };
        assert!(needs_temperature_fallback(hopeless, &params));
    }

    #[test]
    fn confidence_mapping_is_monotonic_and_bounded() {
        let lows = confidence_from_logprob(-3.0);
        let mid = confidence_from_logprob(-0.7);
        let high = confidence_from_logprob(-0.05);
        assert!(lows < mid && mid < high);
        assert!(lows >= 0.0 && high <= 1.0);
        assert_eq!(confidence_from_logprob(0.5), 1.0);
    }
}
