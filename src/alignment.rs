// alignment.rs
//
// Merges the ASR segment stream with diarization turns. Each segment gets
// the speaker whose turn overlaps it most; segments with no overlap fall
// back to the nearest preceding turn within a small gap. A follow-up pass
// fuses consecutive same-speaker segments separated by short pauses so a
// continuous utterance reads as one block.

use log::debug;

use crate::transcript::{SpeakerTurn, TranscriptSegment};

#[derive(Debug, Clone, Copy)]
pub struct AlignmentConfig {
    /// A segment with no overlapping turn inherits the closest turn that
    /// ended no more than this long before it.
    pub gap_fallback_secs: f64,
    /// Consecutive same-speaker segments closer than this are fused.
    pub merge_gap_secs: f64,
    pub merge_same_speaker: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            gap_fallback_secs: 1.0,
            merge_gap_secs: 2.0,
            merge_same_speaker: true,
        }
    }
}

/// Assign speaker labels to segments and optionally fuse same-speaker
/// runs. Ordering and non-overlap of the input are preserved.
pub fn assign_speakers(
    segments: Vec<TranscriptSegment>,
    turns: &[SpeakerTurn],
    config: &AlignmentConfig,
) -> Vec<TranscriptSegment> {
    let mut assigned: Vec<TranscriptSegment> = segments
        .into_iter()
        .map(|mut segment| {
            segment.speaker_id = best_speaker(&segment, turns, config.gap_fallback_secs);
            segment
        })
        .collect();

    if config.merge_same_speaker {
        assigned = merge_same_speaker_runs(assigned, config.merge_gap_secs);
    }

    renumber(&mut assigned);
    assigned
}

/// Stamp every segment with the given speaker. Used when diarization is
/// disabled or degraded.
pub fn assign_uniform_speaker(
    mut segments: Vec<TranscriptSegment>,
    speaker: &str,
) -> Vec<TranscriptSegment> {
    for segment in &mut segments {
        segment.speaker_id = Some(speaker.to_string());
    }
    segments
}

/// Pick the turn with the largest temporal overlap; ties go to the turn
/// that starts earliest.
fn best_speaker(
    segment: &TranscriptSegment,
    turns: &[SpeakerTurn],
    gap_fallback_secs: f64,
) -> Option<String> {
    let mut best: Option<(&SpeakerTurn, f64)> = None;
    for turn in turns {
        let overlap = (segment.end.min(turn.end) - segment.start.max(turn.start)).max(0.0);
        if overlap <= 0.0 {
            continue;
        }
        match best {
            Some((_, best_overlap)) if overlap <= best_overlap => {}
            _ => best = Some((turn, overlap)),
        }
    }
    if let Some((turn, _)) = best {
        return Some(turn.speaker_label.clone());
    }

    // No overlap at all. Short lead-out past the end of a turn still
    // belongs to that speaker.
    let mut preceding: Option<&SpeakerTurn> = None;
    for turn in turns {
        if turn.end <= segment.start {
            match preceding {
                Some(prev) if turn.end <= prev.end => {}
                _ => preceding = Some(turn),
            }
        }
    }
    match preceding {
        Some(turn) if segment.start - turn.end <= gap_fallback_secs => {
            debug!(
                "Segment at {:.2}s inherits {} across a {:.2}s gap",
                segment.start,
                turn.speaker_label,
                segment.start - turn.end
            );
            Some(turn.speaker_label.clone())
        }
        _ => None,
    }
}

fn merge_same_speaker_runs(
    segments: Vec<TranscriptSegment>,
    merge_gap_secs: f64,
) -> Vec<TranscriptSegment> {
    let mut merged: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let fuse = match merged.last() {
            Some(prev) => {
                prev.speaker_id.is_some()
                    && prev.speaker_id == segment.speaker_id
                    && segment.start - prev.end <= merge_gap_secs
            }
            None => false,
        };

        if fuse {
            let prev = merged.last_mut().expect("fuse implies a previous segment");
            let prev_duration = prev.duration();
            let seg_duration = segment.duration();
            let total = prev_duration + seg_duration;

            prev.end = segment.end;
            if !segment.text.is_empty() {
                if !prev.text.is_empty() {
                    prev.text.push(' ');
                }
                prev.text.push_str(&segment.text);
            }
            // Duration-weighted confidence for the fused block.
            if total > 0.0 {
                prev.confidence = ((prev.confidence as f64 * prev_duration
                    + segment.confidence as f64 * seg_duration)
                    / total) as f32;
            }
            prev.words.extend(segment.words);
        } else {
            merged.push(segment);
        }
    }

    merged
}

fn renumber(segments: &mut [TranscriptSegment]) {
    for (idx, segment) in segments.iter_mut().enumerate() {
        segment.id = idx as u32;
    }
}
