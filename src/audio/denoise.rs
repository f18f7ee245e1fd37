// audio/denoise.rs
//
// RNNoise-based noise suppression. The model operates on 10 ms frames at
// 48 kHz, so canonical 16 kHz audio is bridged up and back down around
// the denoiser. Best-effort by contract: callers fall back to filter-only
// processing when this fails.

use anyhow::{anyhow, Result};
use log::debug;
use nnnoiseless::DenoiseState;

use super::resampling::resample;
use super::CANONICAL_SAMPLE_RATE;

const DENOISER_SAMPLE_RATE: u32 = 48_000;

/// Streaming RNNoise wrapper at the model's native 48 kHz.
pub struct NoiseSuppressor {
    denoiser: Box<DenoiseState<'static>>,
    frame_buffer: Vec<f32>,
    frame_size: usize,
}

impl NoiseSuppressor {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate != DENOISER_SAMPLE_RATE {
            return Err(anyhow!(
                "noise suppression requires 48kHz sample rate, got {}Hz",
                sample_rate
            ));
        }

        const FRAME_SIZE: usize = DenoiseState::FRAME_SIZE;
        debug!("RNNoise initialized (frame size {} samples, 10ms @ 48kHz)", FRAME_SIZE);

        Ok(Self {
            denoiser: DenoiseState::new(),
            frame_buffer: Vec::with_capacity(FRAME_SIZE * 2),
            frame_size: FRAME_SIZE,
        })
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }

        self.frame_buffer.extend_from_slice(samples);

        let mut output = Vec::with_capacity(samples.len());
        while self.frame_buffer.len() >= self.frame_size {
            let frame: Vec<f32> = self.frame_buffer.drain(0..self.frame_size).collect();
            let mut denoised = vec![0.0f32; self.frame_size];
            let _vad_prob = self.denoiser.process_frame(&mut denoised, &frame);
            output.extend_from_slice(&denoised);
        }

        output
    }

    /// Pad and flush the trailing partial frame.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.frame_buffer.is_empty() {
            return Vec::new();
        }

        let remaining = self.frame_buffer.len();
        let mut input_frame = std::mem::take(&mut self.frame_buffer);
        input_frame.resize(self.frame_size, 0.0);

        let mut output = vec![0.0f32; self.frame_size];
        self.denoiser.process_frame(&mut output, &input_frame);
        output.truncate(remaining);
        output
    }
}

/// Denoise canonical 16 kHz audio through the 48 kHz bridge. Returns a
/// buffer of the same nominal duration.
pub fn denoise_canonical(samples: &[f32]) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let upsampled = resample(samples, CANONICAL_SAMPLE_RATE, DENOISER_SAMPLE_RATE)?;

    let mut suppressor = NoiseSuppressor::new(DENOISER_SAMPLE_RATE)?;
    let mut denoised = suppressor.process(&upsampled);
    denoised.extend(suppressor.flush());

    resample(&denoised, DENOISER_SAMPLE_RATE, CANONICAL_SAMPLE_RATE)
}
