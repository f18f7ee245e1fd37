// transcript.rs
//
// Durable pipeline outputs and the ephemeral timing artifacts they are
// derived from. Segment and span lists share one invariant: ordered by
// start, no overlaps, end strictly after start.

use serde::{Deserialize, Serialize};

/// A recognized word with its own timing and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
}

/// One transcript segment. `speaker_id` stays unset until alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

impl TranscriptSegment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A speech span produced by VAD, consumed by ASR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechSpan {
    pub start: f64,
    pub end: f64,
}

impl SpeechSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A diarization turn. `speaker_label` is an opaque cluster id, not an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker_label: String,
}

/// Aggregated per-speaker view derived from the final segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    pub label: String,
    pub total_speaking_time: f64,
    pub segment_count: usize,
    pub mean_confidence: f32,
}

/// Substitution/insertion/deletion counts behind a WER figure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordErrorCounts {
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl WordErrorCounts {
    pub fn total(&self) -> usize {
        self.substitutions + self.insertions + self.deletions
    }
}

/// Quality metrics attached to the final result. Immutable after creation.
/// `wer`/`cer` stay `None` when no reference transcript was supplied; an
/// empty reference against a non-empty hypothesis yields `f64::INFINITY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub mean_confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cer: Option<f64>,
    pub word_error_counts: WordErrorCounts,
}

/// Check the shared ordering invariant over `(start, end)` intervals.
pub fn is_ordered_non_overlapping(intervals: impl IntoIterator<Item = (f64, f64)>) -> bool {
    let mut prev_end = f64::NEG_INFINITY;
    for (start, end) in intervals {
        if end <= start || start < prev_end {
            return false;
        }
        prev_end = end;
    }
    true
}

/// Derive one `Speaker` row per distinct `speaker_id` in the transcript,
/// ordered by first appearance. Unattributed segments are ignored.
pub fn speakers_from_segments(segments: &[TranscriptSegment]) -> Vec<Speaker> {
    let mut speakers: Vec<Speaker> = Vec::new();
    let mut confidence_sums: Vec<f64> = Vec::new();

    for segment in segments {
        let Some(speaker_id) = &segment.speaker_id else {
            continue;
        };
        let position = speakers.iter().position(|s| &s.id == speaker_id);
        match position {
            Some(idx) => {
                speakers[idx].total_speaking_time += segment.duration();
                speakers[idx].segment_count += 1;
                confidence_sums[idx] += segment.confidence as f64;
            }
            None => {
                speakers.push(Speaker {
                    id: speaker_id.clone(),
                    label: speaker_id.clone(),
                    total_speaking_time: segment.duration(),
                    segment_count: 1,
                    mean_confidence: 0.0,
                });
                confidence_sums.push(segment.confidence as f64);
            }
        }
    }

    for (speaker, sum) in speakers.iter_mut().zip(confidence_sums) {
        speaker.mean_confidence = (sum / speaker.segment_count as f64) as f32;
    }

    speakers
}
