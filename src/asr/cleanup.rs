// asr/cleanup.rs
//
// Decoder-output cleanup. Whisper-family decoders emit non-speech event
// markers and, on noisy audio, repetition loops the temperature fallback
// does not always catch. This pass removes markers and collapses
// pathological repetition; heavily repetitive output is discarded whole.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// Bracketed or parenthesized event markers: [موسيقى], (تصفيق), [music]...
static EVENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[(][^\])]{1,30}[\])]").expect("event marker regex"));

/// Clean one decoded segment. Returns an empty string when the output is
/// judged to be a pure artifact.
pub fn clean_decoder_output(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_markers = EVENT_MARKER.replace_all(text, " ");
    let words: Vec<&str> = without_markers.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    if words.len() < 3 {
        return words.join(" ");
    }

    // Judge repetitiveness before collapsing; a decode that is mostly one
    // repeated token carries no usable content.
    if repetition_ratio(&words) > 0.7 {
        debug!("Discarding repetitive decoder output: '{}'", without_markers.trim());
        return String::new();
    }

    let collapsed = collapse_word_runs(&words);
    let collapsed = collapse_phrase_runs(&collapsed);
    collapsed.join(" ")
}

/// Collapse three or more consecutive occurrences of one word down to a
/// single occurrence. Doubled words are kept: reduplication is a real
/// intensifier in Arabic ("جداً جداً").
fn collapse_word_runs<'a>(words: &[&'a str]) -> Vec<&'a str> {
    let mut output = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let word = words[i];
        let mut run = 1;
        while i + run < words.len() && words[i + run] == word {
            run += 1;
        }

        if run >= 3 {
            output.push(word);
        } else {
            for _ in 0..run {
                output.push(word);
            }
        }
        i += run;
    }

    output
}

/// Collapse immediately repeated 2..=5 word phrases down to one copy.
fn collapse_phrase_runs<'a>(words: &[&'a str]) -> Vec<&'a str> {
    if words.len() < 4 {
        return words.to_vec();
    }

    let mut output = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let mut matched = false;
        for phrase_len in 2..=std::cmp::min(5, (words.len() - i) / 2) {
            let first = &words[i..i + phrase_len];
            let second = &words[i + phrase_len..i + phrase_len * 2];
            if first == second {
                output.extend_from_slice(first);
                i += phrase_len * 2;
                matched = true;
                break;
            }
        }
        if !matched {
            output.push(words[i]);
            i += 1;
        }
    }

    output
}

/// Fraction of words that are repeats of an earlier word.
fn repetition_ratio(words: &[&str]) -> f32 {
    if words.len() < 4 {
        return 0.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in words {
        *counts.entry(word).or_insert(0) += 1;
    }

    let repeated: usize = counts.values().map(|&c| c.saturating_sub(1)).sum();
    repeated as f32 / words.len() as f32
}
