// audio/normalizer.rs
//
// Dynamic-range normalization. Every enhancement level gets the RMS
// normalizer; `high` additionally runs an offline EBU R128 loudness pass
// with the gain capped at -1 dBTP.

use anyhow::{anyhow, Result};

/// RMS-based normalization with soft clipping at ±0.95.
pub fn normalize_rms(audio: &[f32]) -> Vec<f32> {
    if audio.is_empty() {
        return Vec::new();
    }

    let rms = (audio.iter().map(|&x| x * x).sum::<f32>() / audio.len() as f32).sqrt();
    let peak = audio.iter().fold(0.0f32, |max, &sample| max.max(sample.abs()));

    if rms == 0.0 || peak == 0.0 {
        return audio.to_vec();
    }

    let target_rms = 0.2;
    let target_peak = 0.95;

    let rms_scaling = target_rms / rms;
    let peak_scaling = target_peak / peak;

    // Never push the peak past target; cap the gain so near-silence does
    // not get blown up into noise.
    let scaling_factor = rms_scaling.min(peak_scaling).clamp(0.25, 8.0);

    audio
        .iter()
        .map(|&sample| {
            let scaled = sample * scaling_factor;
            if scaled > 0.95 {
                0.95 + (scaled - 0.95) * 0.05
            } else if scaled < -0.95 {
                -0.95 + (scaled + 0.95) * 0.05
            } else {
                scaled
            }
        })
        .collect()
}

/// Offline EBU R128 loudness normalization targeting -23 LUFS: measure
/// the whole buffer, then apply one uniform gain, capped so the true
/// peak never exceeds -1 dBTP. Two passes; the full buffer is already in
/// memory by the time this stage runs.
pub fn normalize_loudness(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    const TARGET_LUFS: f64 = -23.0;
    const TRUE_PEAK_LIMIT_DB: f64 = -1.0;

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut meter = ebur128::EbuR128::new(
        1,
        sample_rate,
        ebur128::Mode::I | ebur128::Mode::TRUE_PEAK,
    )
    .map_err(|e| anyhow!("failed to create EBU R128 analyzer: {}", e))?;
    meter
        .add_frames_f32(samples)
        .map_err(|e| anyhow!("loudness analysis failed: {}", e))?;

    let measured_lufs = meter
        .loudness_global()
        .map_err(|e| anyhow!("loudness measurement failed: {}", e))?;
    if !measured_lufs.is_finite() {
        // Silence (or audio too short to gate) has no measurable
        // loudness; leave it alone.
        return Ok(samples.to_vec());
    }

    let mut gain_db = TARGET_LUFS - measured_lufs;

    let true_peak = meter
        .true_peak(0)
        .map_err(|e| anyhow!("true peak measurement failed: {}", e))?;
    if true_peak > 0.0 {
        let peak_db = 20.0 * true_peak.log10();
        gain_db = gain_db.min(TRUE_PEAK_LIMIT_DB - peak_db);
    }

    let gain = 10_f64.powf(gain_db / 20.0) as f32;
    Ok(samples.iter().map(|&s| s * gain).collect())
}
