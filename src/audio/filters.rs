// audio/filters.rs
//
// One-pole filters bracketing the speech band: high-pass against rumble
// and hum, low-pass against hiss above the band ASR models care about.

use log::debug;

/// High-pass filter removing low-frequency rumble below the speech band.
pub struct HighPassFilter {
    alpha: f32,
    prev_input: f32,
    prev_output: f32,
}

impl HighPassFilter {
    pub fn new(sample_rate: u32, cutoff_hz: f32) -> Self {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
        let dt = 1.0 / sample_rate as f32;
        let alpha = rc / (rc + dt);

        debug!("High-pass filter: cutoff={}Hz @ {}Hz", cutoff_hz, sample_rate);

        Self {
            alpha,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(samples.len());

        for &sample in samples {
            let filtered = self.alpha * (self.prev_output + sample - self.prev_input);
            self.prev_input = sample;
            self.prev_output = filtered;
            output.push(filtered);
        }

        output
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }
}

/// Low-pass filter rolling off energy above the speech band.
pub struct LowPassFilter {
    alpha: f32,
    prev_output: f32,
}

impl LowPassFilter {
    pub fn new(sample_rate: u32, cutoff_hz: f32) -> Self {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
        let dt = 1.0 / sample_rate as f32;
        let alpha = dt / (rc + dt);

        debug!("Low-pass filter: cutoff={}Hz @ {}Hz", cutoff_hz, sample_rate);

        Self {
            alpha,
            prev_output: 0.0,
        }
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(samples.len());

        for &sample in samples {
            let filtered = self.prev_output + self.alpha * (sample - self.prev_output);
            self.prev_output = filtered;
            output.push(filtered);
        }

        output
    }

    pub fn reset(&mut self) {
        self.prev_output = 0.0;
    }
}
