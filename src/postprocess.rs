// postprocess.rs
//
// Deterministic text post-processing: whitespace normalization, glossary
// substitution and optional punctuation restoration. Operates on segment
// text only; never reorders, merges or retimes segments.

use log::{debug, warn};
use regex::Regex;

use crate::config::{Dialect, GlossaryEntry};
use crate::error::Result;
use crate::transcript::TranscriptSegment;

/// Optional punctuation restoration seam. A failing restorer downgrades
/// to pass-through; punctuation is cosmetic, not load-bearing.
pub trait PunctuationRestorer: Send + Sync {
    fn restore(&self, text: &str) -> Result<String>;
}

struct CompiledRule {
    pattern: Regex,
    replacement: String,
}

pub struct PostProcessor {
    rules: Vec<CompiledRule>,
}

impl PostProcessor {
    /// Compile glossary entries for a job. Entries scoped to another
    /// dialect are skipped; entries that fail to compile are logged and
    /// dropped rather than failing the job.
    pub fn new(glossary: &[GlossaryEntry], dialect: Dialect) -> Self {
        let mut rules = Vec::with_capacity(glossary.len());
        for entry in glossary {
            if let Some(scope) = &entry.dialect {
                if scope != dialect.code() {
                    debug!(
                        "Skipping glossary term '{}' scoped to {}",
                        entry.term, scope
                    );
                    continue;
                }
            }
            let source = format!(r"\b{}\b", regex::escape(&entry.term));
            match Regex::new(&source) {
                Ok(pattern) => rules.push(CompiledRule {
                    pattern,
                    replacement: entry.replacement.clone(),
                }),
                Err(e) => warn!("Unusable glossary term '{}': {}", entry.term, e),
            }
        }
        Self { rules }
    }

    /// Apply whitespace cleanup and glossary rules to every segment, then
    /// optionally restore punctuation.
    pub fn apply(
        &self,
        mut segments: Vec<TranscriptSegment>,
        restorer: Option<&dyn PunctuationRestorer>,
    ) -> Vec<TranscriptSegment> {
        for segment in &mut segments {
            let mut text = normalize_whitespace(&segment.text);
            for rule in &self.rules {
                text = rule.pattern.replace_all(&text, rule.replacement.as_str()).into_owned();
            }
            if let Some(restorer) = restorer {
                match restorer.restore(&text) {
                    Ok(restored) => text = restored,
                    Err(e) => {
                        warn!("Punctuation restoration failed, keeping raw text: {}", e);
                    }
                }
            }
            segment.text = text;
        }
        segments
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
