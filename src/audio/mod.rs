// audio/mod.rs
//
// Audio preprocessing: decode to the canonical representation, then an
// enhancement cascade scaled by the requested level.
//
// Module structure:
// - decoder.rs: ffmpeg/WAV decode to mono 16 kHz f32 PCM
// - filters.rs: one-pole high-pass / low-pass filters
// - resampling.rs: sinc resampler wrapper
// - denoise.rs: RNNoise denoiser with the 48 kHz bridge
// - normalizer.rs: RMS and loudness normalization
// - preprocessor.rs: the per-level cascade

pub mod decoder;
pub mod denoise;
pub mod filters;
pub mod normalizer;
pub mod preprocessor;
pub mod resampling;

use serde::{Deserialize, Serialize};

/// Canonical sample rate all pipeline stages operate on.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// The normalized mono 16 kHz PCM representation of one job's media.
/// Created by the preprocessor, discarded when the job terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    pub enhancement_applied: bool,
}

impl CanonicalAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration_seconds = samples.len() as f64 / sample_rate as f64;
        Self {
            samples,
            sample_rate,
            duration_seconds,
            enhancement_applied: false,
        }
    }

    /// Slice out the samples covering `[start, end]` seconds, clamped to
    /// the buffer. Used to restrict ASR to VAD spans.
    pub fn slice_seconds(&self, start: f64, end: f64) -> &[f32] {
        let to_index = |t: f64| ((t * self.sample_rate as f64) as usize).min(self.samples.len());
        let lo = to_index(start.max(0.0));
        let hi = to_index(end.max(0.0)).max(lo);
        &self.samples[lo..hi]
    }
}

pub use decoder::decode_media;
pub use preprocessor::{preprocess, Preprocessor};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_clamps_to_buffer() {
        let audio = CanonicalAudio::new(vec![0.0; 16_000], CANONICAL_SAMPLE_RATE);
        assert_eq!(audio.slice_seconds(0.0, 0.5).len(), 8_000);
        assert_eq!(audio.slice_seconds(0.5, 10.0).len(), 8_000);
        assert_eq!(audio.slice_seconds(2.0, 3.0).len(), 0);
        assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    }
}
