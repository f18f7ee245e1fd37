// vad/mod.rs
//
// Voice activity segmentation: an energy state machine with hysteresis
// over short frames, followed by a post-pass that merges micro-pauses,
// filters sub-threshold blips and pads span edges so onsets and codas
// are not clipped. Never fails hard: zero spans is a valid result and
// the caller substitutes the full buffer.

use log::{debug, info};

use crate::audio::CanonicalAudio;
use crate::config::Dialect;
use crate::transcript::SpeechSpan;

/// Spans shorter than this are merged into a neighbor or dropped as noise.
pub const MIN_SPAN_SECS: f64 = 0.3;
/// Gaps under this are micro-pauses, not true silence.
pub const MERGE_GAP_SECS: f64 = 0.2;
/// Padding applied to both ends of every span.
pub const PAD_SECS: f64 = 0.1;

/// Detection tunables, adjusted per dialect profile.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS level that opens a span.
    pub onset_threshold: f32,
    /// RMS level below which a frame counts as silence (hysteresis).
    pub offset_threshold: f32,
    /// Continuous silence required to close a span.
    pub min_silence_secs: f64,
    /// Analysis frame length.
    pub frame_secs: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            onset_threshold: 0.015,
            offset_threshold: 0.008,
            min_silence_secs: 0.5,
            frame_secs: 0.03,
        }
    }
}

impl VadConfig {
    /// Dialect profile: fast-cadence dialects split on shorter silences so
    /// rapid turn exchanges do not fuse into one long span.
    pub fn for_dialect(dialect: Dialect) -> Self {
        let mut config = Self::default();
        if dialect.fast_cadence() {
            config.min_silence_secs = 0.35;
        }
        config
    }
}

/// Energy-based voice activity segmenter.
pub struct Segmenter {
    config: VadConfig,
}

impl Segmenter {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(VadConfig::for_dialect(dialect))
    }

    /// Partition canonical audio into ordered, non-overlapping speech spans.
    pub fn segment(&self, audio: &CanonicalAudio) -> Vec<SpeechSpan> {
        let frame_len = ((self.config.frame_secs * audio.sample_rate as f64) as usize).max(1);
        let frame_secs = frame_len as f64 / audio.sample_rate as f64;
        let silence_frames = (self.config.min_silence_secs / frame_secs).ceil() as usize;

        let mut raw_spans: Vec<SpeechSpan> = Vec::new();
        let mut span_start: Option<f64> = None;
        let mut last_voiced_end = 0.0f64;
        let mut silence_run = 0usize;

        for (idx, frame) in audio.samples.chunks(frame_len).enumerate() {
            let start = idx as f64 * frame_secs;
            let end = start + frame.len() as f64 / audio.sample_rate as f64;
            let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();

            match span_start {
                None => {
                    if rms >= self.config.onset_threshold {
                        span_start = Some(start);
                        last_voiced_end = end;
                        silence_run = 0;
                    }
                }
                Some(opened) => {
                    if rms >= self.config.offset_threshold {
                        last_voiced_end = end;
                        silence_run = 0;
                    } else {
                        silence_run += 1;
                        if silence_run >= silence_frames {
                            raw_spans.push(SpeechSpan {
                                start: opened,
                                end: last_voiced_end,
                            });
                            span_start = None;
                        }
                    }
                }
            }
        }

        if let Some(opened) = span_start {
            raw_spans.push(SpeechSpan {
                start: opened,
                end: last_voiced_end.max(opened + frame_secs),
            });
        }

        let spans = postprocess_spans(raw_spans, audio.duration_seconds);
        info!(
            "VAD: {} span(s) over {:.2}s of audio",
            spans.len(),
            audio.duration_seconds
        );
        spans
    }
}

/// Merge micro-pauses, drop noise blips, pad edges. Keeps the ordering
/// and non-overlap invariants.
fn postprocess_spans(raw: Vec<SpeechSpan>, duration: f64) -> Vec<SpeechSpan> {
    if raw.is_empty() {
        return raw;
    }

    // Micro-pauses under MERGE_GAP_SECS are not true silence.
    let mut merged: Vec<SpeechSpan> = Vec::with_capacity(raw.len());
    for span in raw {
        match merged.last_mut() {
            Some(prev) if span.start - prev.end < MERGE_GAP_SECS => {
                prev.end = prev.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }

    // Sub-minimum spans fold into an adjacent span when close, otherwise
    // they are noise.
    let mut filtered: Vec<SpeechSpan> = Vec::with_capacity(merged.len());
    for span in merged {
        if span.duration() >= MIN_SPAN_SECS {
            filtered.push(span);
            continue;
        }
        match filtered.last_mut() {
            Some(prev) if span.start - prev.end < MERGE_GAP_SECS * 2.0 => {
                prev.end = span.end;
            }
            _ => {
                debug!("VAD dropped {:.0}ms blip at {:.2}s", span.duration() * 1000.0, span.start);
            }
        }
    }

    // Pad both edges; keep neighbors from overlapping by splitting the gap.
    let count = filtered.len();
    for i in 0..count {
        let prev_end = if i == 0 { 0.0 } else { filtered[i - 1].end };
        let next_start = if i + 1 < count { filtered[i + 1].start } else { duration };

        let span = &mut filtered[i];
        span.start = (span.start - PAD_SECS).max(prev_end).max(0.0);
        let padded_end = (span.end + PAD_SECS).min(duration);
        span.end = if i + 1 < count {
            padded_end.min((span.end + next_start) / 2.0)
        } else {
            padded_end
        };
    }

    filtered.retain(|s| s.end > s.start);
    filtered
}

/// Substitute the full buffer when VAD found nothing, letting ASR attempt
/// recognition unconditionally.
pub fn spans_or_full(spans: Vec<SpeechSpan>, duration: f64) -> Vec<SpeechSpan> {
    if spans.is_empty() && duration > 0.0 {
        vec![SpeechSpan {
            start: 0.0,
            end: duration,
        }]
    } else {
        spans
    }
}
