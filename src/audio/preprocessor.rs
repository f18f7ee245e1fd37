// audio/preprocessor.rs
//
// The enhancement cascade. Filters always run; the learned denoiser joins
// at medium/high; loudness compression joins at high. Denoiser failures
// downgrade to filter-only processing, they never fail the job.

use std::path::Path;

use log::{info, warn};

use super::denoise::denoise_canonical;
use super::filters::{HighPassFilter, LowPassFilter};
use super::normalizer::{normalize_loudness, normalize_rms};
use super::{decode_media, CanonicalAudio};
use crate::config::EnhancementLevel;
use crate::error::Result;

const HIGH_PASS_CUTOFF_HZ: f32 = 70.0;
const LOW_PASS_CUTOFF_HZ: f32 = 7_800.0;

/// Applies the enhancement cascade for one configured level.
pub struct Preprocessor {
    level: EnhancementLevel,
}

impl Preprocessor {
    pub fn new(level: EnhancementLevel) -> Self {
        Self { level }
    }

    /// Run the cascade over decoded canonical audio.
    pub fn enhance(&self, mut audio: CanonicalAudio) -> CanonicalAudio {
        let sample_rate = audio.sample_rate;

        let mut high_pass = HighPassFilter::new(sample_rate, HIGH_PASS_CUTOFF_HZ);
        let mut low_pass = LowPassFilter::new(sample_rate, LOW_PASS_CUTOFF_HZ);
        audio.samples = low_pass.process(&high_pass.process(&audio.samples));

        if self.level.uses_denoiser() {
            match denoise_canonical(&audio.samples) {
                Ok(denoised) => {
                    audio.samples = denoised;
                }
                Err(e) => {
                    // Degraded quality beats a failed job.
                    warn!("Denoiser unavailable ({}), continuing filter-only", e);
                }
            }
        }

        audio.samples = normalize_rms(&audio.samples);

        if self.level == EnhancementLevel::High {
            match normalize_loudness(&audio.samples, sample_rate) {
                Ok(leveled) => {
                    audio.samples = leveled;
                }
                Err(e) => {
                    warn!("Loudness normalization unavailable ({}), skipping", e);
                }
            }
        }

        audio.duration_seconds = audio.samples.len() as f64 / sample_rate as f64;
        audio.enhancement_applied = true;
        audio
    }
}

/// Decode a media file and apply enhancement: the whole of pipeline stage 1.
pub fn preprocess(path: &Path, level: EnhancementLevel) -> Result<CanonicalAudio> {
    let decoded = decode_media(path)?;
    let audio = Preprocessor::new(level).enhance(decoded);
    info!(
        "Preprocessing complete: {:.2}s canonical audio, level {:?}",
        audio.duration_seconds, level
    );
    Ok(audio)
}
