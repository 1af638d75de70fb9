//! Assessment outputs produced by the interpreter, assessor, and extractor.
//!
//! These shapes double as the structured-output contracts handed to the
//! language model (via their JSON Schemas), so they derive `JsonSchema`
//! alongside serde.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{AnswerType, EngagementLevel};

/// Output of the answer interpreter: classification plus any literal facts
/// present in the answer.
///
/// A clarification request does not preclude fact extraction: "3 years. What
/// do you mean by types?" classifies as a clarification request and still
/// yields the "3 years" fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Interpretation {
    pub answer_type: AnswerType,
    #[serde(default)]
    pub literal_facts: Vec<String>,
}

impl Interpretation {
    /// Safe default used when classification fails: the turn proceeds as a
    /// partial answer rather than blocking.
    pub fn fallback() -> Self {
        Self {
            answer_type: AnswerType::PartialAnswer,
            literal_facts: Vec::new(),
        }
    }
}

/// Engagement scoring for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngagementAssessment {
    pub answer_type: AnswerType,
    pub engagement_level: EngagementLevel,
    /// 1-5.
    pub detail_score: u8,
    /// 0.0-1.0.
    pub relevance_score: f64,
    pub enthusiasm: bool,
    pub reasoning: String,
}

impl EngagementAssessment {
    /// Neutral default used when the assessor fails: assume an engaged
    /// partial answer so a model hiccup never counts against the candidate.
    pub fn fallback(answer_type: AnswerType) -> Self {
        Self {
            answer_type,
            engagement_level: EngagementLevel::Engaged,
            detail_score: 3,
            relevance_score: 0.5,
            enthusiasm: false,
            reasoning: "fallback: assessor unavailable".to_string(),
        }
    }
}

/// Whether one assessment criterion was demonstrated by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CriterionResult {
    pub criterion: String,
    pub demonstrated: bool,
    pub evidence: String,
}

/// Criteria assessment for a predefined-question answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CriteriaAssessment {
    /// 1-5.
    pub answer_quality: u8,
    pub criteria: Vec<CriterionResult>,
    pub reasoning: String,
}

impl CriteriaAssessment {
    /// Length-based heuristic used when the model call fails. All criteria
    /// are conservatively marked not demonstrated.
    pub fn heuristic(answer: &str, criteria: &[String]) -> Self {
        let words = answer.split_whitespace().count();
        let answer_quality = match words {
            0..=9 => 1,
            10..=29 => 2,
            30..=59 => 3,
            60..=99 => 4,
            _ => 5,
        };
        Self {
            answer_quality,
            criteria: criteria
                .iter()
                .map(|c| CriterionResult {
                    criterion: c.clone(),
                    demonstrated: false,
                    evidence: "unable to assess".to_string(),
                })
                .collect(),
            reasoning: "heuristic assessment: model unavailable".to_string(),
        }
    }
}

/// One cross-gap coverage hit: the current answer also addressed another
/// pending question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageHit {
    pub gap_id: Uuid,
    pub covered: bool,
    /// 0.0-1.0.
    pub confidence: f64,
    pub evidence: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpretation_fallback_is_partial() {
        let fallback = Interpretation::fallback();
        assert_eq!(fallback.answer_type, AnswerType::PartialAnswer);
        assert!(fallback.literal_facts.is_empty());
    }

    #[test]
    fn test_engagement_fallback_is_engaged() {
        let fallback = EngagementAssessment::fallback(AnswerType::DirectAnswer);
        assert_eq!(fallback.engagement_level, EngagementLevel::Engaged);
        assert_eq!(fallback.answer_type, AnswerType::DirectAnswer);
    }

    #[test]
    fn test_heuristic_quality_scales_with_length() {
        let criteria = vec!["People leadership".to_string()];
        assert_eq!(CriteriaAssessment::heuristic("no", &criteria).answer_quality, 1);

        let medium = "word ".repeat(40);
        assert_eq!(CriteriaAssessment::heuristic(&medium, &criteria).answer_quality, 3);

        let long = "word ".repeat(150);
        let assessed = CriteriaAssessment::heuristic(&long, &criteria);
        assert_eq!(assessed.answer_quality, 5);
        assert!(assessed.criteria.iter().all(|c| !c.demonstrated));
    }

    #[test]
    fn test_interpretation_missing_facts_defaults_empty() {
        let parsed: Interpretation =
            serde_json::from_str(r#"{"answer_type":"direct_answer"}"#).unwrap();
        assert!(parsed.literal_facts.is_empty());
    }

    #[test]
    fn test_engagement_schema_has_required_fields() {
        let schema = schemars::schema_for!(EngagementAssessment);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("answer_type"));
        assert!(json.contains("detail_score"));
        assert!(json.contains("enthusiasm"));
    }
}
