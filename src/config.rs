// config.rs
//
// Job configuration: language/dialect, model tier, enhancement level,
// diarization flag, custom vocabulary and glossary. The external API
// hands over raw codes; `JobConfig::validate` resolves them into typed
// values or rejects the submission with a ValidationError.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Arabic dialect registers the pipeline is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Modern Standard Arabic
    Msa,
    Egyptian,
    Gulf,
    Iraqi,
    Levantine,
    Maghrebi,
}

impl Dialect {
    /// Parse an external dialect code. Unknown codes are a validation error.
    pub fn from_code(code: &str) -> Option<Dialect> {
        match code {
            "ar" | "ar-MSA" | "msa" => Some(Dialect::Msa),
            "ar-EG" | "egyptian" => Some(Dialect::Egyptian),
            "ar-GLF" | "gulf" => Some(Dialect::Gulf),
            "ar-IQ" | "iraqi" => Some(Dialect::Iraqi),
            "ar-LEV" | "levantine" => Some(Dialect::Levantine),
            "ar-MA" | "maghrebi" => Some(Dialect::Maghrebi),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Dialect::Msa => "ar",
            Dialect::Egyptian => "ar-EG",
            Dialect::Gulf => "ar-GLF",
            Dialect::Iraqi => "ar-IQ",
            Dialect::Levantine => "ar-LEV",
            Dialect::Maghrebi => "ar-MA",
        }
    }

    /// Initial decoder prompt biasing recognition toward Arabic script and,
    /// where applicable, a dialect register.
    pub fn initial_prompt(&self) -> &'static str {
        match self {
            Dialect::Msa => "فيما يلي نص باللغة العربية الفصحى.",
            Dialect::Egyptian => "فيما يلي حوار باللهجة المصرية.",
            Dialect::Gulf => "فيما يلي حوار باللهجة الخليجية.",
            Dialect::Iraqi => "فيما يلي حوار باللهجة العراقية.",
            Dialect::Levantine => "فيما يلي حوار باللهجة الشامية.",
            Dialect::Maghrebi => "فيما يلي حوار باللهجة المغاربية.",
        }
    }

    /// Dialects with fast speech cadence split on shorter silences.
    pub fn fast_cadence(&self) -> bool {
        matches!(self, Dialect::Egyptian | Dialect::Levantine | Dialect::Iraqi)
    }
}

/// Requested model size. Larger tiers trade latency for accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub fn from_code(code: &str) -> Option<ModelTier> {
        match code {
            "small" => Some(ModelTier::Small),
            "medium" => Some(ModelTier::Medium),
            "large" => Some(ModelTier::Large),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }

    /// The next-smaller tier, used for degraded fallback after a timeout.
    pub fn smaller(&self) -> Option<ModelTier> {
        match self {
            ModelTier::Large => Some(ModelTier::Medium),
            ModelTier::Medium => Some(ModelTier::Small),
            ModelTier::Small => None,
        }
    }
}

/// Enhancement effort applied by the audio preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementLevel {
    Light,
    Medium,
    High,
}

impl EnhancementLevel {
    pub fn from_code(code: &str) -> Option<EnhancementLevel> {
        match code {
            "light" => Some(EnhancementLevel::Light),
            "medium" => Some(EnhancementLevel::Medium),
            "high" => Some(EnhancementLevel::High),
            _ => None,
        }
    }

    /// Whether the learned denoiser runs at this level.
    pub fn uses_denoiser(&self) -> bool {
        matches!(self, EnhancementLevel::Medium | EnhancementLevel::High)
    }
}

/// One glossary substitution, optionally scoped to a dialect code.
/// A scoped entry is skipped when the job's dialect doesn't match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub replacement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
}

/// Raw job configuration as submitted by the external API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Dialect code, e.g. "ar-IQ". Must be known.
    pub dialect: String,
    /// Model tier code: "small" | "medium" | "large".
    pub model_tier: String,
    /// Enhancement level code: "light" | "medium" | "high".
    pub enhancement: String,
    /// Run speaker diarization.
    #[serde(default)]
    pub diarization: bool,
    /// Optional speaker-count hint constraining diarization clustering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_count_hint: Option<usize>,
    /// When true, the requested tier is used verbatim; no automatic downgrade.
    #[serde(default)]
    pub pin_model_tier: bool,
    /// Recognition hints biasing the decoder toward specific vocabulary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_vocabulary: Vec<String>,
    /// Post-processing substitutions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glossary: Vec<GlossaryEntry>,
    /// Optional reference transcript enabling WER/CER scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_transcript: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            dialect: "ar".to_string(),
            model_tier: "medium".to_string(),
            enhancement: "light".to_string(),
            diarization: false,
            speaker_count_hint: None,
            pin_model_tier: false,
            custom_vocabulary: Vec::new(),
            glossary: Vec::new(),
            reference_transcript: None,
        }
    }
}

impl JobConfig {
    /// Resolve raw codes into typed values. Called by `submit` before any
    /// job state is created; an unknown code rejects the whole submission.
    pub fn validate(&self) -> Result<ResolvedConfig> {
        let dialect = Dialect::from_code(&self.dialect)
            .ok_or_else(|| PipelineError::validation(format!("unknown dialect code '{}'", self.dialect)))?;
        let tier = ModelTier::from_code(&self.model_tier)
            .ok_or_else(|| PipelineError::validation(format!("unknown model tier '{}'", self.model_tier)))?;
        let enhancement = EnhancementLevel::from_code(&self.enhancement).ok_or_else(|| {
            PipelineError::validation(format!("unknown enhancement level '{}'", self.enhancement))
        })?;

        if let Some(hint) = self.speaker_count_hint {
            if hint == 0 {
                return Err(PipelineError::validation("speaker_count_hint must be at least 1"));
            }
        }

        Ok(ResolvedConfig {
            dialect,
            tier,
            enhancement,
            diarization: self.diarization,
            speaker_count_hint: self.speaker_count_hint,
            pin_model_tier: self.pin_model_tier,
        })
    }
}

/// Typed view of a validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub dialect: Dialect,
    pub tier: ModelTier,
    pub enhancement: EnhancementLevel,
    pub diarization: bool,
    pub speaker_count_hint: Option<usize>,
    pub pin_model_tier: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn base_config() -> JobConfig {
        JobConfig {
            dialect: "ar-IQ".to_string(),
            model_tier: "large".to_string(),
            enhancement: "medium".to_string(),
            diarization: true,
            speaker_count_hint: Some(2),
            pin_model_tier: false,
            custom_vocabulary: vec![],
            glossary: vec![],
            reference_transcript: None,
        }
    }

    #[test]
    fn valid_config_resolves() {
        let resolved = base_config().validate().unwrap();
        assert_eq!(resolved.dialect, Dialect::Iraqi);
        assert_eq!(resolved.tier, ModelTier::Large);
        assert_eq!(resolved.enhancement, EnhancementLevel::Medium);
        assert!(resolved.diarization);
    }

    #[test]
    fn unknown_dialect_is_validation_error() {
        let mut config = base_config();
        config.dialect = "ar-XX".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn unknown_tier_is_validation_error() {
        let mut config = base_config();
        config.model_tier = "huge".to_string();
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn zero_speaker_hint_rejected() {
        let mut config = base_config();
        config.speaker_count_hint = Some(0);
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn tier_downgrade_ladder() {
        assert_eq!(ModelTier::Large.smaller(), Some(ModelTier::Medium));
        assert_eq!(ModelTier::Medium.smaller(), Some(ModelTier::Small));
        assert_eq!(ModelTier::Small.smaller(), None);
    }
}
