//! Interview tuning knobs and LLM call settings.
//!
//! Everything here deserializes from `config.toml` with serde defaults, so a
//! missing file or a partial file both yield a working configuration.

use serde::{Deserialize, Serialize};

/// Thresholds and budgets driving the routing decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    /// Completeness threshold that ends a dynamic-gap interview.
    #[serde(default = "default_min_completeness_dynamic")]
    pub minimum_completeness_dynamic: f64,

    /// Completeness tracked (but not used as a stop condition) in
    /// predefined mode.
    #[serde(default = "default_min_completeness_predefined")]
    pub minimum_completeness_predefined: f64,

    /// Consecutive low-quality answers that terminate the interview.
    #[serde(default = "default_disengagement_limit")]
    pub disengagement_limit: u32,

    /// Base probe budget per gap before history adjustments.
    #[serde(default = "default_max_probes")]
    pub base_max_probes: u32,

    /// Quality signal (detail score or answer quality) at or above which an
    /// answer is acceptable and no follow-up is needed.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,

    /// Cross-gap coverage confidence at which another gap is marked filled.
    #[serde(default = "default_coverage_mark_confidence")]
    pub coverage_mark_confidence: f64,

    /// Coverage confidence at which a filled gap is skipped entirely
    /// (below it, a short confirmation follow-up may still be asked).
    #[serde(default = "default_coverage_skip_confidence")]
    pub coverage_skip_confidence: f64,

    /// Severity boost applied to gaps of skills the candidate volunteered
    /// unprompted.
    #[serde(default = "default_severity_boost")]
    pub severity_boost: f64,

    /// How many recent messages are given to the extractor for co-reference
    /// resolution.
    #[serde(default = "default_conversation_window")]
    pub conversation_window: usize,
}

fn default_min_completeness_dynamic() -> f64 {
    0.9
}

fn default_min_completeness_predefined() -> f64 {
    0.6
}

fn default_disengagement_limit() -> u32 {
    3
}

fn default_max_probes() -> u32 {
    3
}

fn default_quality_threshold() -> u8 {
    3
}

fn default_coverage_mark_confidence() -> f64 {
    0.7
}

fn default_coverage_skip_confidence() -> f64 {
    0.9
}

fn default_severity_boost() -> f64 {
    0.2
}

fn default_conversation_window() -> usize {
    6
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            minimum_completeness_dynamic: default_min_completeness_dynamic(),
            minimum_completeness_predefined: default_min_completeness_predefined(),
            disengagement_limit: default_disengagement_limit(),
            base_max_probes: default_max_probes(),
            quality_threshold: default_quality_threshold(),
            coverage_mark_confidence: default_coverage_mark_confidence(),
            coverage_skip_confidence: default_coverage_skip_confidence(),
            severity_boost: default_severity_boost(),
            conversation_window: default_conversation_window(),
        }
    }
}

impl InterviewConfig {
    /// The completeness threshold for the given mode.
    pub fn minimum_completeness(&self, mode: crate::session::InterviewMode) -> f64 {
        match mode {
            crate::session::InterviewMode::DynamicGap => self.minimum_completeness_dynamic,
            crate::session::InterviewMode::PredefinedQuestions => {
                self.minimum_completeness_predefined
            }
        }
    }
}

/// Settings for language-model calls made by the core components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for user-facing generation (questions). Structured
    /// extraction always runs at 0.0.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Bounded retries for read-only model calls.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds, doubled per attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InterviewMode;

    #[test]
    fn test_defaults() {
        let config = InterviewConfig::default();
        assert!((config.minimum_completeness_dynamic - 0.9).abs() < f64::EPSILON);
        assert!((config.minimum_completeness_predefined - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.disengagement_limit, 3);
        assert_eq!(config.base_max_probes, 3);
        assert_eq!(config.quality_threshold, 3);
    }

    #[test]
    fn test_minimum_completeness_by_mode() {
        let config = InterviewConfig::default();
        assert!((config.minimum_completeness(InterviewMode::DynamicGap) - 0.9).abs() < f64::EPSILON);
        assert!(
            (config.minimum_completeness(InterviewMode::PredefinedQuestions) - 0.6).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: InterviewConfig = toml::from_str("disengagement_limit = 5").unwrap();
        assert_eq!(config.disengagement_limit, 5);
        assert_eq!(config.base_max_probes, 3);
    }

    #[test]
    fn test_llm_settings_defaults() {
        let settings: LlmSettings = toml::from_str("").unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.backoff_ms, 500);
        assert!(!settings.model.is_empty());
    }
}
