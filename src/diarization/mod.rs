// diarization/mod.rs
//
// Speaker diarization contract. The pipeline depends only on the
// `DiarizationAdapter` trait; the pyannote-rs engine lives behind the
// `pyannote` feature. Diarization is best-effort: when it fails or times
// out, the orchestrator falls back to a single default speaker and the
// job still completes.

#[cfg(feature = "pyannote")]
pub mod pyannote;

use async_trait::async_trait;

use crate::audio::CanonicalAudio;
use crate::error::Result;
use crate::transcript::SpeakerTurn;

/// Speaker assigned to every segment when diarization is disabled or
/// degraded.
pub const DEFAULT_SPEAKER: &str = "speaker_0";

pub struct DiarizationRequest<'a> {
    pub audio: &'a CanonicalAudio,
    /// Expected speaker count from the submitter, used to cap clustering.
    pub speaker_hint: Option<usize>,
}

/// Who-spoke-when turns, ordered by start.
#[derive(Debug, Clone, Default)]
pub struct DiarizationOutput {
    pub turns: Vec<SpeakerTurn>,
}

impl DiarizationOutput {
    /// Distinct speaker labels in first-appearance order.
    pub fn speaker_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for turn in &self.turns {
            if !labels.contains(&turn.speaker_label) {
                labels.push(turn.speaker_label.clone());
            }
        }
        labels
    }
}

#[async_trait]
pub trait DiarizationAdapter: Send + Sync {
    async fn diarize(&self, request: DiarizationRequest<'_>) -> Result<DiarizationOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_keep_first_appearance_order() {
        let output = DiarizationOutput {
            turns: vec![
                SpeakerTurn {
                    start: 0.0,
                    end: 2.0,
                    speaker_label: "speaker_1".to_string(),
                },
                SpeakerTurn {
                    start: 2.0,
                    end: 4.0,
                    speaker_label: "speaker_0".to_string(),
                },
                SpeakerTurn {
                    start: 4.0,
                    end: 6.0,
                    speaker_label: "speaker_1".to_string(),
                },
            ],
        };
        assert_eq!(output.speaker_labels(), vec!["speaker_1", "speaker_0"]);
    }
}
