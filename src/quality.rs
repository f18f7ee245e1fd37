// quality.rs
//
// Transcript quality scoring: duration-weighted mean confidence always,
// WER and CER when the submitter supplied a reference transcript. Arabic
// text is normalized on both sides before comparison so orthographic
// variance (diacritics, hamza seats, taa marbuta) does not count as an
// error.

use log::info;

use crate::transcript::{QualityMetrics, TranscriptSegment, WordErrorCounts};

/// Normalize Arabic text for error-rate comparison. Idempotent: applying
/// it twice changes nothing.
pub fn normalize_arabic(text: &str) -> String {
    let folded: String = text
        .chars()
        .filter_map(|c| match c {
            // Harakat, tanween, shadda, sukun.
            '\u{064B}'..='\u{0652}' => None,
            // Tatweel.
            '\u{0640}' => None,
            'أ' | 'إ' | 'آ' => Some('ا'),
            'ى' => Some('ي'),
            'ة' => Some('ه'),
            _ => Some(c),
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein alignment over tokens, with the error breakdown.
fn edit_counts<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> WordErrorCounts {
    let rows = reference.len() + 1;
    let cols = hypothesis.len() + 1;

    // dp[i][j] = minimal edits turning reference[..i] into hypothesis[..j].
    let mut dp = vec![vec![0usize; cols]; rows];
    for i in 0..rows {
        dp[i][0] = i;
    }
    for j in 0..cols {
        dp[0][j] = j;
    }
    for i in 1..rows {
        for j in 1..cols {
            let substitution_cost = if reference[i - 1] == hypothesis[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j - 1] + substitution_cost)
                .min(dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1);
        }
    }

    // Backtrace to attribute each edit.
    let mut counts = WordErrorCounts::default();
    let (mut i, mut j) = (reference.len(), hypothesis.len());
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && reference[i - 1] == hypothesis[j - 1] && dp[i][j] == dp[i - 1][j - 1] {
            i -= 1;
            j -= 1;
        } else if i > 0 && j > 0 && dp[i][j] == dp[i - 1][j - 1] + 1 {
            counts.substitutions += 1;
            i -= 1;
            j -= 1;
        } else if i > 0 && dp[i][j] == dp[i - 1][j] + 1 {
            counts.deletions += 1;
            i -= 1;
        } else {
            counts.insertions += 1;
            j -= 1;
        }
    }
    counts
}

fn rate(errors: usize, reference_len: usize, hypothesis_len: usize) -> f64 {
    if reference_len == 0 {
        // Nothing to compare against. A non-empty hypothesis against an
        // empty reference is all insertions with no denominator.
        if hypothesis_len == 0 {
            return 0.0;
        }
        return f64::INFINITY;
    }
    errors as f64 / reference_len as f64
}

/// Word error rate with its edit breakdown. Both sides are normalized.
pub fn word_error_rate(reference: &str, hypothesis: &str) -> (f64, WordErrorCounts) {
    let reference = normalize_arabic(reference);
    let hypothesis = normalize_arabic(hypothesis);
    let ref_words: Vec<&str> = reference.split_whitespace().collect();
    let hyp_words: Vec<&str> = hypothesis.split_whitespace().collect();

    let counts = edit_counts(&ref_words, &hyp_words);
    (rate(counts.total(), ref_words.len(), hyp_words.len()), counts)
}

/// Character error rate over normalized text, whitespace excluded.
pub fn char_error_rate(reference: &str, hypothesis: &str) -> f64 {
    let ref_chars: Vec<char> = normalize_arabic(reference)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let hyp_chars: Vec<char> = normalize_arabic(hypothesis)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let counts = edit_counts(&ref_chars, &hyp_chars);
    rate(counts.total(), ref_chars.len(), hyp_chars.len())
}

/// Duration-weighted mean segment confidence. Zero-duration segments
/// contribute nothing; an empty transcript scores zero.
pub fn mean_confidence(segments: &[TranscriptSegment]) -> f32 {
    let total_duration: f64 = segments.iter().map(|s| s.duration()).sum();
    if total_duration <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = segments
        .iter()
        .map(|s| s.confidence as f64 * s.duration())
        .sum();
    (weighted / total_duration) as f32
}

/// Score a finished transcript, against a reference when one was given.
pub fn score(segments: &[TranscriptSegment], reference: Option<&str>) -> QualityMetrics {
    let mean_confidence = mean_confidence(segments);

    let (wer, cer, word_error_counts) = match reference {
        Some(reference) => {
            let hypothesis = segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let (wer, counts) = word_error_rate(reference, &hypothesis);
            let cer = char_error_rate(reference, &hypothesis);
            info!(
                "Quality: WER {:.3}, CER {:.3}, mean confidence {:.2}",
                wer, cer, mean_confidence
            );
            (Some(wer), Some(cer), counts)
        }
        None => (None, None, WordErrorCounts::default()),
    };

    QualityMetrics {
        mean_confidence,
        wer,
        cer,
        word_error_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str, confidence: f32) -> TranscriptSegment {
        TranscriptSegment {
            id: 0,
            start,
            end,
            text: text.to_string(),
            confidence,
            speaker_id: None,
            words: Vec::new(),
        }
    }

    #[test]
    fn normalization_folds_orthographic_variants() {
        assert_eq!(normalize_arabic("أَهْلاً"), "اهلا");
        assert_eq!(normalize_arabic("مدرسة"), "مدرسه");
        assert_eq!(normalize_arabic("مستشفى"), "مستشفي");
        assert_eq!(normalize_arabic("العـــربية"), "العربيه");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_arabic("إِنَّ المدرسة مستشفى");
        assert_eq!(normalize_arabic(&once), once);
    }

    #[test]
    fn identical_text_scores_zero() {
        let (wer, counts) = word_error_rate("السلام عليكم", "السلام عليكم");
        assert_eq!(wer, 0.0);
        assert_eq!(counts.total(), 0);
        assert_eq!(char_error_rate("السلام عليكم", "السلام عليكم"), 0.0);
    }

    #[test]
    fn diacritics_do_not_count_as_errors() {
        let (wer, _) = word_error_rate("السَّلامُ عَلَيكُم", "السلام عليكم");
        assert_eq!(wer, 0.0);
    }

    #[test]
    fn dropped_word_is_half_of_two() {
        let (wer, counts) = word_error_rate("شلونك اخوي", "شلونك");
        assert_eq!(wer, 0.5);
        assert_eq!(counts.deletions, 1);
        assert_eq!(counts.substitutions, 0);
        assert_eq!(counts.insertions, 0);
    }

    #[test]
    fn substitution_breakdown() {
        let (wer, counts) = word_error_rate("ذهب الولد الى المدرسة", "ذهب البنت الى المدرسة");
        assert_eq!(counts.substitutions, 1);
        assert_eq!(wer, 0.25);
    }

    #[test]
    fn empty_reference_sentinels() {
        let (wer, _) = word_error_rate("", "");
        assert_eq!(wer, 0.0);
        let (wer, _) = word_error_rate("", "كلام غير متوقع");
        assert!(wer.is_infinite());
        assert!(char_error_rate("", "كلام").is_infinite());
    }

    #[test]
    fn confidence_is_duration_weighted() {
        let segments = vec![
            segment(0.0, 9.0, "نص طويل", 1.0),
            segment(9.0, 10.0, "قصير", 0.0),
        ];
        let mean = mean_confidence(&segments);
        assert!((mean - 0.9).abs() < 1e-6);
    }

    #[test]
    fn score_without_reference_has_no_rates() {
        let segments = vec![segment(0.0, 2.0, "مرحبا", 0.8)];
        let metrics = score(&segments, None);
        assert!(metrics.wer.is_none());
        assert!(metrics.cer.is_none());
        assert!((metrics.mean_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn score_with_reference_fills_rates() {
        let segments = vec![segment(0.0, 2.0, "السلام عليكم", 0.9)];
        let metrics = score(&segments, Some("السلام عليكم"));
        assert_eq!(metrics.wer, Some(0.0));
        assert_eq!(metrics.cer, Some(0.0));
    }
}
