// audio/resampling.rs

use anyhow::Result;
use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// High-quality sinc resampling with parameters scaled to the rate ratio.
pub fn resample(input: &[f32], from_sample_rate: u32, to_sample_rate: u32) -> Result<Vec<f32>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    if from_sample_rate == to_sample_rate {
        return Ok(input.to_vec());
    }

    let ratio = to_sample_rate as f64 / from_sample_rate as f64;

    // Upsampling (16k -> 48k for the denoiser) and heavy downsampling both
    // get the longer sinc; mild ratio changes can afford the cheaper one.
    let (sinc_len, interpolation_type) = if ratio >= 2.0 || ratio <= 0.5 {
        (512, SincInterpolationType::Cubic)
    } else {
        (256, SincInterpolationType::Linear)
    };

    debug!(
        "Resampling {}Hz -> {}Hz (ratio {:.3}, sinc {})",
        from_sample_rate, to_sample_rate, ratio, sinc_len
    );

    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: 0.95,
        interpolation: interpolation_type,
        oversampling_factor: sinc_len,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input.len(), 1)?;

    let waves_in = vec![input.to_vec()];
    let mut waves_out = resampler.process(&waves_in, None)?;

    Ok(waves_out.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_rates_match() {
        let input = vec![0.25f32; 1_000];
        let out = resample(&input, 16_000, 16_000).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn upsample_roughly_triples_length() {
        let input = vec![0.1f32; 16_000];
        let out = resample(&input, 16_000, 48_000).unwrap();
        let expected = 48_000f64;
        assert!((out.len() as f64 - expected).abs() / expected < 0.05);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(resample(&[], 16_000, 48_000).unwrap().is_empty());
    }
}
