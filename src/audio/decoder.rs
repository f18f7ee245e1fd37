// audio/decoder.rs
//
// Decode arbitrary container/codec input into canonical mono 16 kHz f32
// PCM. WAV files are read directly with hound; everything else goes
// through an ffmpeg subprocess emitting raw f32le on stdout.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context};
use log::{debug, info};

use super::resampling::resample;
use super::{CanonicalAudio, CANONICAL_SAMPLE_RATE};
use crate::error::{PipelineError, Result};

/// Decode a media file into canonical audio. No enhancement is applied here.
pub fn decode_media(path: &Path) -> Result<CanonicalAudio> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let samples = if is_wav {
        decode_wav(path).map_err(|e| PipelineError::unsupported_format(format!("{e:#}")))?
    } else {
        decode_with_ffmpeg(path).map_err(|e| PipelineError::unsupported_format(format!("{e:#}")))?
    };

    if samples.is_empty() {
        return Err(PipelineError::corrupt_media(format!(
            "decode of {} produced zero samples",
            path.display()
        )));
    }

    let audio = CanonicalAudio::new(samples, CANONICAL_SAMPLE_RATE);
    info!(
        "Decoded {} to {} samples ({:.2}s) at {} Hz",
        path.display(),
        audio.samples.len(),
        audio.duration_seconds,
        audio.sample_rate
    );
    Ok(audio)
}

/// Read a WAV file, downmix to mono and resample to the canonical rate.
fn decode_wav(path: &Path) -> anyhow::Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path).context("failed to open WAV")?;
    let spec = reader.spec();
    debug!(
        "WAV input: {} Hz, {} channel(s), {:?} {} bit",
        spec.sample_rate, spec.channels, spec.sample_format, spec.bits_per_sample
    );

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    let mono = to_mono(&interleaved, spec.channels as usize);
    // A failed resample must not pass through at the wrong rate; every
    // downstream timestamp would be scaled by the rate ratio.
    resample(&mono, spec.sample_rate, CANONICAL_SAMPLE_RATE).with_context(|| {
        format!(
            "failed to resample from {} Hz to {} Hz",
            spec.sample_rate, CANONICAL_SAMPLE_RATE
        )
    })
}

/// Average interleaved channels down to mono.
fn to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Decode via ffmpeg to raw f32le mono at the canonical rate on stdout.
fn decode_with_ffmpeg(path: &Path) -> anyhow::Result<Vec<f32>> {
    let mut command = Command::new("ffmpeg");
    command
        .arg("-nostdin")
        .arg("-i")
        .arg(path)
        .arg("-f")
        .arg("f32le")
        .arg("-acodec")
        .arg("pcm_f32le")
        .arg("-ar")
        .arg(CANONICAL_SAMPLE_RATE.to_string())
        .arg("-ac")
        .arg("1")
        .arg("-")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("ffmpeg decode command: {:?}", command);

    let mut child = command
        .spawn()
        .map_err(|e| anyhow!("failed to spawn ffmpeg: {}", e))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;

    let mut raw_bytes = Vec::new();
    stdout.read_to_end(&mut raw_bytes)?;

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("ffmpeg failed to decode audio: {}", stderr.trim()));
    }

    if raw_bytes.len() % 4 != 0 {
        return Err(anyhow!(
            "invalid PCM stream length: {} bytes (not divisible by 4)",
            raw_bytes.len()
        ));
    }

    let samples = raw_bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_mono_16k_wav_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16_000.0).sin() * 0.5)
            .collect();
        write_wav(&path, 16_000, 1, &samples);

        let audio = decode_media(&path).unwrap();
        assert_eq!(audio.sample_rate, CANONICAL_SAMPLE_RATE);
        assert_eq!(audio.samples.len(), 16_000);
        assert!(!audio.enhancement_applied);
    }

    #[test]
    fn resamples_44k_wav_to_canonical_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd_rate.wav");
        // One second at 44.1 kHz must stay one second at 16 kHz.
        let samples: Vec<f32> = (0..44_100)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44_100.0).sin() * 0.5)
            .collect();
        write_wav(&path, 44_100, 1, &samples);

        let audio = decode_media(&path).unwrap();
        assert_eq!(audio.sample_rate, CANONICAL_SAMPLE_RATE);
        assert!((audio.duration_seconds - 1.0).abs() < 0.05);
    }

    #[test]
    fn downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Left 0.5, right -0.5 averages to silence.
        let interleaved: Vec<f32> = (0..8_000).flat_map(|_| [0.5f32, -0.5f32]).collect();
        write_wav(&path, 16_000, 2, &interleaved);

        let audio = decode_media(&path).unwrap();
        assert_eq!(audio.samples.len(), 8_000);
        assert!(audio.samples.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn empty_wav_is_corrupt_media() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 16_000, 1, &[]);

        let err = decode_media(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptMedia);
    }

    #[test]
    fn garbage_wav_is_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not RIFF data").unwrap();

        let err = decode_media(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
    }
}
