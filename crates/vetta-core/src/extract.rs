//! Skill and criteria extraction from resume text and answers.
//!
//! Dynamic-gap mode extracts `(skill, attribute, value)` observations; a
//! single answer may fill several attributes across several skills, and the
//! recent conversation window lets the model resolve co-references ("same
//! duration for React"). Predefined mode assesses answers against a
//! question's criteria and checks whether the answer also covered other
//! pending questions.
//!
//! Extraction failures degrade to empty results: a malformed record skips
//! only the affected update, never the turn, and one gap's failure never
//! blocks the others.

use schemars::JsonSchema;
use serde::Deserialize;
use uuid::Uuid;

use vetta_types::assessment::{CoverageHit, CriteriaAssessment};
use vetta_types::config::LlmSettings;
use vetta_types::gap::Gap;
use vetta_types::llm::LlmError;
use vetta_types::message::{MessageRole, TurnMessage};
use vetta_types::skill::{is_meaningful, ExtractedSkill, SkillAttribute, SkillObservation};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::llm::structured;

const RESUME_SYSTEM_PROMPT: &str = r#"You analyze a candidate's resume for a technical interview.

Extract every technical skill with these six attributes where the resume
states them, and the literal string "unknown" where it does not:
- duration (e.g. "3 years")
- depth (e.g. "basic CRUD", "advanced optimization")
- autonomy (e.g. "solo project", "led team of 5")
- scale (e.g. "10M users", "enterprise-scale")
- constraints (e.g. "legacy system", "tight deadlines")
- production_vs_prototype ("production" | "prototype" | "PoC")

Also write a short summary of the candidate's background (3-5 sentences).

Return JSON: {"summary": "...", "skills": [{"name", "duration", "depth",
"autonomy", "scale", "constraints", "production_vs_prototype",
"confidence_score", "evidence"}]}"#;

const ANSWER_SYSTEM_PROMPT: &str = r#"You extract skill information from a candidate's interview answer.

EXTRACT ALL information mentioned, even if not directly asked:
- One answer can fill several attributes at once ("3 years in production with
  50K users" gives duration, production_vs_prototype, and scale).
- The candidate may mention skills other than the one asked about.
- Resolve references to earlier answers using the conversation provided: if
  the candidate says "same duration as Python", copy the duration value they
  previously stated for Python.
- If the candidate explicitly corrects an earlier statement ("actually it was
  2 years, not 3"), emit the corrected value; if they retract a value without
  replacing it, list the attribute name in "corrections".

Use the literal string "unknown" for attributes the answer says nothing
about. Return JSON: {"skills": [{"name", "duration", "depth", "autonomy",
"scale", "constraints", "production_vs_prototype", "confidence_score",
"evidence", "corrections"}]}"#;

const CRITERIA_SYSTEM_PROMPT: &str = r#"You evaluate a candidate's answer to a predefined interview question.

For EACH listed criterion decide whether the answer demonstrates it, quoting
the supporting evidence when it does. Then rate the overall answer_quality
1-5 (1 = evasive or empty, 5 = thorough and specific).

Return JSON: {"answer_quality": 1-5, "criteria": [{"criterion",
"demonstrated", "evidence"}], "reasoning": "..."}"#;

const COVERAGE_SYSTEM_PROMPT: &str = r#"You check whether an interview answer ALSO answers other pending questions.

For each listed question decide:
- covered: true only when the answer contains substantial, relevant
  information for that question. A passing mention is NOT enough.
- confidence: 0.0-1.0 (0.9+ = thorough coverage, 0.5-0.7 = partial,
  follow-up recommended)
- evidence: the part of the answer that addresses the question

Be conservative. Return JSON: {"coverage_results": [{"gap_id", "covered",
"confidence", "evidence"}]}"#;

const RESUME_COVERAGE_SYSTEM_PROMPT: &str = r#"You check which predefined interview questions a resume already answers.

Write a short summary of the candidate's background (3-5 sentences). Then for
each listed question decide:
- covered: true only when the resume contains substantial, relevant
  information that answers the question. A passing mention is NOT enough.
- confidence: 0.0-1.0
- evidence: the resume content that answers it

Be conservative. Return JSON: {"summary": "...", "coverage_results":
[{"gap_id", "covered", "confidence", "evidence"}]}"#;

const SKIP_SYSTEM_PROMPT: &str = r#"You detect whether a candidate wants to skip the current interview question.

Skip intent includes: explicit requests ("skip this", "next question"),
statements of non-experience ("I've never done that"), and refusals to
answer. A vague or short answer is NOT skip intent.

Return JSON: {"skip_detected": true/false, "skip_reason": "short reason"}"#;

// ---------------------------------------------------------------------------
// Raw model output shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct RawSkillRecord {
    name: String,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    depth: Option<String>,
    #[serde(default)]
    autonomy: Option<String>,
    #[serde(default)]
    scale: Option<String>,
    #[serde(default)]
    constraints: Option<String>,
    #[serde(default)]
    production_vs_prototype: Option<String>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    evidence: Option<String>,
    /// Attribute names the candidate retracted without replacement.
    #[serde(default)]
    corrections: Vec<String>,
}

impl RawSkillRecord {
    fn attribute(&self, attr: SkillAttribute) -> Option<&String> {
        match attr {
            SkillAttribute::Duration => self.duration.as_ref(),
            SkillAttribute::Depth => self.depth.as_ref(),
            SkillAttribute::Autonomy => self.autonomy.as_ref(),
            SkillAttribute::Scale => self.scale.as_ref(),
            SkillAttribute::Constraints => self.constraints.as_ref(),
            SkillAttribute::ProductionVsPrototype => self.production_vs_prototype.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawResumeAnalysis {
    summary: String,
    skills: Vec<RawSkillRecord>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawAnswerExtraction {
    skills: Vec<RawSkillRecord>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawCoverageResult {
    gap_id: String,
    covered: bool,
    confidence: f64,
    #[serde(default)]
    evidence: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawCoverageAnalysis {
    coverage_results: Vec<RawCoverageResult>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawResumeCoverage {
    summary: String,
    coverage_results: Vec<RawCoverageResult>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawSkipIntent {
    skip_detected: bool,
    #[serde(default)]
    skip_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Skills and summary derived from one-time resume analysis.
#[derive(Debug, Clone)]
pub struct ResumeSeed {
    pub summary: String,
    pub skills: Vec<ExtractedSkill>,
}

/// Stateless skill/criteria extractor.
pub struct SkillExtractor;

impl SkillExtractor {
    /// One-time resume analysis at session creation.
    ///
    /// Unlike the per-answer calls this one surfaces its error: a session
    /// cannot start without the seed analysis.
    #[tracing::instrument(name = "seed_from_resume", skip_all, fields(resume_len = resume_text.len()))]
    pub async fn seed_from_resume(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        resume_text: &str,
    ) -> Result<ResumeSeed, LlmError> {
        let analysis = structured::request::<RawResumeAnalysis>(
            provider,
            retry,
            settings,
            "seed_from_resume",
            RESUME_SYSTEM_PROMPT,
            resume_text,
        )
        .await?;

        let keep = |value: &Option<String>| {
            value
                .as_deref()
                .filter(|v| is_meaningful(v))
                .map(|v| v.trim().to_string())
        };
        let skills = analysis
            .skills
            .into_iter()
            .filter(|raw| !raw.name.trim().is_empty())
            .map(|raw| {
                let mut skill = ExtractedSkill::new(raw.name.clone());
                skill.confidence_score = raw.confidence_score.unwrap_or(1.0).clamp(0.0, 1.0);
                skill.evidence = raw.evidence.clone().unwrap_or_default();
                skill.duration = keep(&raw.duration);
                skill.depth = keep(&raw.depth);
                skill.autonomy = keep(&raw.autonomy);
                skill.scale = keep(&raw.scale);
                skill.constraints = keep(&raw.constraints);
                skill.production_vs_prototype = keep(&raw.production_vs_prototype);
                skill
            })
            .collect();

        tracing::info!(summary_len = analysis.summary.len(), "resume analyzed");
        Ok(ResumeSeed {
            summary: analysis.summary,
            skills,
        })
    }

    /// Extract attribute observations from one answer (dynamic-gap mode).
    ///
    /// Returns an empty list on model failure: previously captured data is
    /// never discarded by a failed or empty extraction.
    #[tracing::instrument(name = "extract_from_answer", skip_all)]
    pub async fn extract_from_answer(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        question: &str,
        answer: &str,
        known_skills: &[String],
        focus_skill: Option<&str>,
        focus_attribute: Option<SkillAttribute>,
        literal_facts: &[String],
        window: &[TurnMessage],
    ) -> Vec<SkillObservation> {
        let mut prompt = String::new();
        if !window.is_empty() {
            prompt.push_str("Previous conversation:\n");
            for message in window {
                let speaker = match message.role {
                    MessageRole::Assistant => "Interviewer",
                    _ => "Candidate",
                };
                prompt.push_str(&format!("{speaker}: {}\n", message.content));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "Interviewer asked: {question}\nCandidate answered: {answer}\n\n"
        ));
        if let (Some(skill), Some(attr)) = (focus_skill, focus_attribute) {
            prompt.push_str(&format!("We specifically asked about: {skill} - {attr}\n"));
        }
        if !known_skills.is_empty() {
            prompt.push_str(&format!(
                "Known skills from the resume: {}\n",
                known_skills.join(", ")
            ));
        }
        if !literal_facts.is_empty() {
            prompt.push_str(&format!(
                "Facts already identified in this answer: {}\n",
                literal_facts.join("; ")
            ));
        }

        let extraction = match structured::request::<RawAnswerExtraction>(
            provider,
            retry,
            settings,
            "extract_from_answer",
            ANSWER_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(extraction) => extraction,
            Err(err) => {
                tracing::warn!(error = %err, "skill extraction failed; skipping update");
                return Vec::new();
            }
        };

        let mut observations = Vec::new();
        for record in &extraction.skills {
            if record.name.trim().is_empty() {
                continue;
            }
            let confidence = record.confidence_score.unwrap_or(1.0).clamp(0.0, 1.0);
            for attr in SkillAttribute::ALL {
                if let Some(value) = record.attribute(attr) {
                    if is_meaningful(value) {
                        observations.push(SkillObservation {
                            skill: record.name.clone(),
                            attribute: attr,
                            value: value.clone(),
                            correction: false,
                            evidence: record.evidence.clone(),
                            confidence,
                        });
                    }
                }
            }
            for corrected in &record.corrections {
                match corrected.parse::<SkillAttribute>() {
                    Ok(attr) => observations.push(SkillObservation {
                        skill: record.name.clone(),
                        attribute: attr,
                        value: "unknown".to_string(),
                        correction: true,
                        evidence: record.evidence.clone(),
                        confidence,
                    }),
                    Err(_) => {
                        // Malformed attribute name: skip this correction only.
                        tracing::debug!(attribute = %corrected, "ignoring unknown corrected attribute");
                    }
                }
            }
        }

        tracing::debug!(count = observations.len(), "attribute observations extracted");
        observations
    }

    /// Assess an answer against a predefined question's criteria.
    ///
    /// Falls back to a length heuristic on model failure; the turn always
    /// gets an assessment.
    #[tracing::instrument(name = "assess_criteria", skip_all)]
    pub async fn assess_criteria(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        question: &str,
        answer: &str,
        criteria: &[String],
        category: &str,
    ) -> CriteriaAssessment {
        let criteria_list = criteria
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Category: {category}\nQuestion: {question}\nCriteria:\n{criteria_list}\n\nAnswer: {answer}"
        );

        match structured::request::<CriteriaAssessment>(
            provider,
            retry,
            settings,
            "assess_criteria",
            CRITERIA_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(mut assessment) => {
                assessment.answer_quality = assessment.answer_quality.clamp(1, 5);
                assessment
            }
            Err(err) => {
                tracing::warn!(error = %err, "criteria assessment failed; using heuristic");
                CriteriaAssessment::heuristic(answer, criteria)
            }
        }
    }

    /// Check whether an answer also covers other pending predefined
    /// questions. One batched call for all candidates; empty on failure.
    #[tracing::instrument(name = "cross_gap_coverage", skip_all, fields(pending = pending.len()))]
    pub async fn cross_gap_coverage(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        answer: &str,
        pending: &[&Gap],
    ) -> Vec<CoverageHit> {
        if pending.is_empty() {
            return Vec::new();
        }

        let mut questions = String::new();
        for (i, gap) in pending.iter().enumerate() {
            questions.push_str(&format!(
                "{}. gap_id: {}\n   Category: {}\n   Question: {}\n   Assesses: {}\n",
                i + 1,
                gap.id,
                gap.category,
                gap.description,
                gap.criteria().join(", ")
            ));
        }
        let prompt = format!("Candidate's answer:\n{answer}\n\nOther questions to check:\n{questions}");

        let analysis = match structured::request::<RawCoverageAnalysis>(
            provider,
            retry,
            settings,
            "cross_gap_coverage",
            COVERAGE_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(error = %err, "cross-gap analysis failed; skipping");
                return Vec::new();
            }
        };

        let known: std::collections::HashSet<Uuid> = pending.iter().map(|g| g.id).collect();
        let hits: Vec<CoverageHit> = analysis
            .coverage_results
            .into_iter()
            .filter_map(|raw| {
                let gap_id = Uuid::parse_str(&raw.gap_id).ok()?;
                known.contains(&gap_id).then_some(CoverageHit {
                    gap_id,
                    covered: raw.covered,
                    confidence: raw.confidence.clamp(0.0, 1.0),
                    evidence: raw.evidence,
                })
            })
            .collect();

        let covered = hits.iter().filter(|h| h.covered).count();
        tracing::debug!(covered, checked = pending.len(), "cross-gap coverage analyzed");
        hits
    }

    /// Check which predefined questions the resume already answers
    /// (predefined mode, once at session creation).
    ///
    /// Returns the resume summary and the coverage hits. On model failure a
    /// truncated resume stands in for the summary and no question is marked
    /// filled -- the interview just asks them all.
    #[tracing::instrument(name = "resume_coverage", skip_all, fields(questions = gaps.len()))]
    pub async fn resume_coverage(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        resume_text: &str,
        gaps: &[Gap],
    ) -> (String, Vec<CoverageHit>) {
        let mut questions = String::new();
        for (i, gap) in gaps.iter().enumerate() {
            questions.push_str(&format!(
                "{}. gap_id: {}\n   Category: {}\n   Question: {}\n   Assesses: {}\n",
                i + 1,
                gap.id,
                gap.category,
                gap.description,
                gap.criteria().join(", ")
            ));
        }
        let prompt = format!("Resume:\n{resume_text}\n\nQuestions:\n{questions}");

        match structured::request::<RawResumeCoverage>(
            provider,
            retry,
            settings,
            "resume_coverage",
            RESUME_COVERAGE_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(analysis) => {
                let known: std::collections::HashSet<Uuid> = gaps.iter().map(|g| g.id).collect();
                let hits = analysis
                    .coverage_results
                    .into_iter()
                    .filter_map(|raw| {
                        let gap_id = Uuid::parse_str(&raw.gap_id).ok()?;
                        known.contains(&gap_id).then_some(CoverageHit {
                            gap_id,
                            covered: raw.covered,
                            confidence: raw.confidence.clamp(0.0, 1.0),
                            evidence: raw.evidence,
                        })
                    })
                    .collect();
                (analysis.summary, hits)
            }
            Err(err) => {
                tracing::warn!(error = %err, "resume coverage analysis failed; asking all questions");
                let summary: String = resume_text.chars().take(500).collect();
                (summary, Vec::new())
            }
        }
    }

    /// Detect explicit skip intent (predefined mode).
    ///
    /// Returns `(false, None)` on model failure: a detection error never
    /// skips a question on the candidate's behalf.
    #[tracing::instrument(name = "detect_skip", skip_all)]
    pub async fn detect_skip(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        question: &str,
        answer: &str,
        previous_answers: &[String],
    ) -> (bool, Option<String>) {
        let previous = if previous_answers.is_empty() {
            "(none)".to_string()
        } else {
            previous_answers.join("\n")
        };
        let prompt = format!(
            "Current question: {question}\nPrevious candidate messages:\n{previous}\nMost recent message: {answer}"
        );

        match structured::request::<RawSkipIntent>(
            provider,
            retry,
            settings,
            "detect_skip",
            SKIP_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(intent) => {
                let reason = intent
                    .skip_reason
                    .map(|r| r.chars().take(50).collect::<String>());
                (intent.skip_detected, reason)
            }
            Err(err) => {
                tracing::warn!(error = %err, "skip detection failed; assuming no skip");
                (false, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_skill_record_deserialize() {
        let json = r#"{"name": "Python", "duration": "3 years", "scale": "unknown"}"#;
        let record: RawSkillRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, "Python");
        assert_eq!(record.duration.as_deref(), Some("3 years"));
        assert!(record.corrections.is_empty());
    }

    #[test]
    fn test_raw_resume_analysis_deserialize() {
        let json = r#"{"summary": "Backend engineer.", "skills": [{"name": "Go"}]}"#;
        let analysis: RawResumeAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.skills.len(), 1);
    }

    #[test]
    fn test_raw_coverage_filters_unknown_gap_ids() {
        // parse failure of a gap_id must drop only that entry
        let raw = RawCoverageResult {
            gap_id: "not-a-uuid".to_string(),
            covered: true,
            confidence: 0.9,
            evidence: String::new(),
        };
        assert!(Uuid::parse_str(&raw.gap_id).is_err());
    }

    #[test]
    fn test_prompts_mention_key_behaviors() {
        assert!(ANSWER_SYSTEM_PROMPT.contains("same duration as Python"));
        assert!(ANSWER_SYSTEM_PROMPT.contains("unknown"));
        assert!(COVERAGE_SYSTEM_PROMPT.contains("conservative"));
        assert!(RESUME_SYSTEM_PROMPT.contains("production_vs_prototype"));
    }

    #[test]
    fn test_raw_skip_intent_defaults() {
        let intent: RawSkipIntent = serde_json::from_str(r#"{"skip_detected": false}"#).unwrap();
        assert!(!intent.skip_detected);
        assert!(intent.skip_reason.is_none());
    }
}
