//! Engagement assessment: answer quality, relevance, and enthusiasm.
//!
//! Disengagement is deliberately hard to trigger: it requires low relevance
//! AND low detail AND no enthusiasm. Clarification requests and
//! enthusiastic-but-brief answers are never scored disengaged, whatever the
//! model says -- the normalization step enforces this after the call.

use vetta_types::assessment::EngagementAssessment;
use vetta_types::config::LlmSettings;
use vetta_types::message::{AnswerType, EngagementLevel};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::llm::structured;

const ASSESS_SYSTEM_PROMPT: &str = r#"You assess a candidate's answer in a structured interview.

Score these dimensions:
- answer_type: direct_answer | partial_answer | off_topic | clarification_request
- engagement_level: engaged | disengaged
- detail_score: 1-5 (1 = bare minimum, 5 = rich specifics)
- relevance_score: 0.0-1.0 (how much the answer addresses the question)
- enthusiasm: whether the candidate shows interest in the topic
- reasoning: one or two sentences explaining the scores

Mark "disengaged" ONLY when the answer is irrelevant AND thin AND flat.
Short but relevant and enthusiastic answers are "engaged". A candidate asking
for clarification is participating, not disengaging.

Return JSON with exactly those fields."#;

/// Explicit refusals that mark obvious disengagement when the model is
/// unavailable. Deliberately conservative.
const OBVIOUS_DISENGAGEMENT: [&str; 10] = [
    "i cant",
    "i can't",
    "i cannot",
    "no",
    "nope",
    "idk",
    "dunno",
    "dont know",
    "don't know",
    "whatever",
];

/// Stateless engagement assessor.
pub struct EngagementAssessor;

impl EngagementAssessor {
    /// Assess one answer against the question and gap being probed.
    ///
    /// Never fails: on model error a heuristic checks for obvious refusals,
    /// otherwise the answer is assumed engaged.
    #[tracing::instrument(name = "assess_engagement", skip_all)]
    pub async fn assess(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        question: &str,
        answer: &str,
        gap_description: &str,
        answer_type: AnswerType,
    ) -> EngagementAssessment {
        let prompt = format!(
            "Question: {question}\nWhat we are trying to learn: {gap_description}\nAnswer: {answer}"
        );

        let mut assessed = match structured::request::<EngagementAssessment>(
            provider,
            retry,
            settings,
            "assess_engagement",
            ASSESS_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(assessment) => assessment,
            Err(err) => {
                tracing::warn!(error = %err, "engagement assessment failed; using heuristic");
                Self::heuristic(answer, answer_type)
            }
        };

        // The interpreter's classification is canonical; the assessor's own
        // answer_type is advisory only.
        assessed.answer_type = answer_type;
        Self::normalize(assessed)
    }

    /// Enforce the disengagement design rule regardless of model output.
    fn normalize(mut assessment: EngagementAssessment) -> EngagementAssessment {
        assessment.detail_score = assessment.detail_score.clamp(1, 5);
        assessment.relevance_score = assessment.relevance_score.clamp(0.0, 1.0);

        let truly_disengaged = assessment.relevance_score < 0.5
            && assessment.detail_score <= 2
            && !assessment.enthusiasm;
        let clarifying = assessment.answer_type == AnswerType::ClarificationRequest;

        if assessment.engagement_level == EngagementLevel::Disengaged
            && (clarifying || !truly_disengaged)
        {
            tracing::debug!("overriding disengaged verdict: signal does not meet the bar");
            assessment.engagement_level = EngagementLevel::Engaged;
        }
        assessment
    }

    fn heuristic(answer: &str, answer_type: AnswerType) -> EngagementAssessment {
        let normalized = answer.trim().to_lowercase();
        let refused = OBVIOUS_DISENGAGEMENT.contains(&normalized.as_str());
        if refused {
            EngagementAssessment {
                answer_type: AnswerType::PartialAnswer,
                engagement_level: EngagementLevel::Disengaged,
                detail_score: 1,
                relevance_score: 0.2,
                enthusiasm: false,
                reasoning: "heuristic: explicit refusal phrase".to_string(),
            }
        } else {
            EngagementAssessment::fallback(answer_type)
        }
    }

    /// Counter update rule.
    ///
    /// Clarification requests reset (the candidate is participating);
    /// off-topic answers increment (avoidance pattern); disengaged answers
    /// increment; engaged answers reset. Explicit skips leave the counter
    /// untouched -- handled by the caller before this runs.
    pub fn update_counter(current: u32, assessment: &EngagementAssessment) -> u32 {
        match assessment.answer_type {
            AnswerType::ClarificationRequest => 0,
            AnswerType::OffTopic => current + 1,
            _ => {
                if assessment.engagement_level == EngagementLevel::Disengaged {
                    current + 1
                } else {
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(
        answer_type: AnswerType,
        level: EngagementLevel,
        detail: u8,
        relevance: f64,
        enthusiasm: bool,
    ) -> EngagementAssessment {
        EngagementAssessment {
            answer_type,
            engagement_level: level,
            detail_score: detail,
            relevance_score: relevance,
            enthusiasm,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_clarification_never_disengaged() {
        let raw = assessment(
            AnswerType::ClarificationRequest,
            EngagementLevel::Disengaged,
            1,
            0.1,
            false,
        );
        let normalized = EngagementAssessor::normalize(raw);
        assert_eq!(normalized.engagement_level, EngagementLevel::Engaged);
    }

    #[test]
    fn test_enthusiastic_brief_answer_not_disengaged() {
        let raw = assessment(
            AnswerType::PartialAnswer,
            EngagementLevel::Disengaged,
            2,
            0.3,
            true,
        );
        let normalized = EngagementAssessor::normalize(raw);
        assert_eq!(normalized.engagement_level, EngagementLevel::Engaged);
    }

    #[test]
    fn test_genuine_disengagement_stands() {
        let raw = assessment(
            AnswerType::PartialAnswer,
            EngagementLevel::Disengaged,
            1,
            0.2,
            false,
        );
        let normalized = EngagementAssessor::normalize(raw);
        assert_eq!(normalized.engagement_level, EngagementLevel::Disengaged);
    }

    #[test]
    fn test_counter_clarification_resets() {
        let a = assessment(
            AnswerType::ClarificationRequest,
            EngagementLevel::Engaged,
            2,
            0.8,
            false,
        );
        assert_eq!(EngagementAssessor::update_counter(2, &a), 0);
    }

    #[test]
    fn test_counter_off_topic_increments() {
        let a = assessment(AnswerType::OffTopic, EngagementLevel::Engaged, 3, 0.2, false);
        assert_eq!(EngagementAssessor::update_counter(1, &a), 2);
    }

    #[test]
    fn test_counter_disengaged_increments() {
        let a = assessment(
            AnswerType::PartialAnswer,
            EngagementLevel::Disengaged,
            1,
            0.1,
            false,
        );
        assert_eq!(EngagementAssessor::update_counter(0, &a), 1);
    }

    #[test]
    fn test_counter_engaged_resets() {
        let a = assessment(
            AnswerType::DirectAnswer,
            EngagementLevel::Engaged,
            4,
            0.9,
            true,
        );
        assert_eq!(EngagementAssessor::update_counter(2, &a), 0);
    }

    #[test]
    fn test_heuristic_catches_refusals() {
        let assessed = EngagementAssessor::heuristic("idk", AnswerType::PartialAnswer);
        assert_eq!(assessed.engagement_level, EngagementLevel::Disengaged);

        let assessed = EngagementAssessor::heuristic(
            "I built the ingest pipeline",
            AnswerType::DirectAnswer,
        );
        assert_eq!(assessed.engagement_level, EngagementLevel::Engaged);
    }

    #[test]
    fn test_scores_clamped() {
        let raw = assessment(AnswerType::DirectAnswer, EngagementLevel::Engaged, 9, 1.7, false);
        let normalized = EngagementAssessor::normalize(raw);
        assert_eq!(normalized.detail_score, 5);
        assert!((normalized.relevance_score - 1.0).abs() < f64::EPSILON);
    }
}
