//! Per-turn state update: fold the turn's signals into a session snapshot.
//!
//! `apply` is the synchronous, pure heart of the pipeline: given the working
//! copy of the session state and everything the LLM-backed components
//! produced for this answer, it merges skills, updates counters, resolves
//! gaps (including gaps other than the one currently probed), applies
//! severity boosts, recomputes completeness, and appends the answer to the
//! history. Both the blocking and streaming entry points run exactly this
//! function, which is what guarantees identical outcomes.

use std::collections::BTreeMap;

use uuid::Uuid;

use vetta_types::assessment::{CoverageHit, CriteriaAssessment, EngagementAssessment, Interpretation};
use vetta_types::config::InterviewConfig;
use vetta_types::gap::GapKind;
use vetta_types::message::{AnswerMeta, AnswerType, TurnMessage};
use vetta_types::session::{InterviewMode, SessionState};
use vetta_types::skill::{MergeEffect, SkillAttribute, SkillObservation};

use crate::engagement::EngagementAssessor;
use crate::routing;

/// Everything the components produced for one inbound answer.
#[derive(Debug, Clone)]
pub struct TurnSignals {
    pub answer_text: String,
    pub interpretation: Interpretation,
    pub engagement: EngagementAssessment,
    pub criteria: Option<CriteriaAssessment>,
    pub observations: Vec<SkillObservation>,
    pub coverage: Vec<CoverageHit>,
    /// Some(reason) when explicit skip intent was detected.
    pub skip_reason: Option<String>,
}

impl TurnSignals {
    pub fn skip_requested(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// What changed during `apply`, for routing and acknowledgment.
#[derive(Debug, Default)]
pub struct TurnReport {
    /// Newly filled attributes per skill (lower-cased name).
    pub new_attributes: BTreeMap<String, Vec<SkillAttribute>>,
    /// Gaps resolved this turn, in resolution order.
    pub gaps_resolved: Vec<Uuid>,
    pub current_gap_resolved: bool,
    pub quality_signal: u8,
    /// Display names of skills touched by this answer.
    pub skills_extracted: Vec<String>,
}

/// Fold one answered turn into the session state.
pub fn apply(state: &mut SessionState, signals: &TurnSignals, config: &InterviewConfig) -> TurnReport {
    let mut report = TurnReport {
        quality_signal: routing::quality_signal(&signals.engagement, signals.criteria.as_ref()),
        ..TurnReport::default()
    };
    let current_gap_id = state.current_gap_id;
    let skip_requested = signals.skip_requested();

    // Engagement counter. An explicit skip is a user choice, not
    // disengagement: the counter is left untouched.
    if !skip_requested {
        state.engagement.consecutive_low_quality = EngagementAssessor::update_counter(
            state.engagement.consecutive_low_quality,
            &signals.engagement,
        );
        state.engagement.questions_answered += 1;
    }

    // Probe history on the gap that was asked about.
    if let Some(gap) = current_gap_id.and_then(|id| state.gap_mut(id)) {
        gap.record_answer(signals.interpretation.answer_type);
    }

    merge_observations(state, signals, &mut report);

    // Explicit skip: terminal for the current gap.
    if skip_requested {
        let mut skipped = None;
        if let Some(gap) = current_gap_id.and_then(|id| state.gap_mut(id)) {
            if gap.skip(signals.skip_reason.clone()).is_ok() {
                skipped = Some(gap.id);
            }
        }
        if let Some(gap_id) = skipped {
            state.engagement.questions_skipped += 1;
            tracing::info!(gap_id = %gap_id, "gap skipped at candidate's request");
        }
    } else if report.quality_signal >= config.quality_threshold
        && signals.interpretation.answer_type != AnswerType::ClarificationRequest
    {
        // Quality-based resolution of the gap currently probed: either
        // scoring path at or above the threshold resolves it, independent of
        // attribute bookkeeping. A clarification request never resolves --
        // the candidate has not answered yet.
        if let Some(gap) = current_gap_id.and_then(|id| state.gap_mut(id)) {
            if gap.resolve().is_ok() {
                report.gaps_resolved.push(gap.id);
                tracing::debug!(gap_id = %gap.id, quality = report.quality_signal, "gap resolved on quality signal");
            }
        }
    }

    report.current_gap_resolved = current_gap_id
        .and_then(|id| state.gap(id))
        .map(|g| g.status == vetta_types::gap::GapStatus::Resolved)
        .unwrap_or(false);

    apply_coverage(state, &signals.coverage, config);
    boost_unprompted_skills(state, &report, config);

    let score = routing::completeness(state);
    state.raise_completeness(score);

    // Append the answer to the history with its assessment metadata.
    state.push_message(TurnMessage::user(
        signals.answer_text.clone(),
        AnswerMeta {
            answer_type: signals.interpretation.answer_type,
            engagement_level: signals.engagement.engagement_level,
            detail_score: signals.engagement.detail_score,
            relevance_score: signals.engagement.relevance_score,
            enthusiasm: signals.engagement.enthusiasm,
            gap_id: current_gap_id,
            skills_extracted: report.skills_extracted.clone(),
            gap_resolved: report.current_gap_resolved,
        },
    ));

    tracing::info!(
        resolved = report.gaps_resolved.len(),
        quality = report.quality_signal,
        consecutive_low = state.engagement.consecutive_low_quality,
        completeness = state.completeness_score,
        "turn applied"
    );
    report
}

/// Merge attribute observations into the skill set and retire the matching
/// gap targets. An observation for a skill other than the current gap's
/// updates -- and may resolve -- that other gap in the same turn.
fn merge_observations(state: &mut SessionState, signals: &TurnSignals, report: &mut TurnReport) {
    for obs in &signals.observations {
        let effect = state.skills.merge(obs);
        if effect != MergeEffect::Unchanged {
            let display_name = state
                .skills
                .get(&obs.skill)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| obs.skill.clone());
            if !report.skills_extracted.contains(&display_name) {
                report.skills_extracted.push(display_name);
            }
        }

        if effect == MergeEffect::NewAttribute {
            report
                .new_attributes
                .entry(obs.skill.to_lowercase())
                .or_default()
                .push(obs.attribute);
        }

        if matches!(effect, MergeEffect::NewAttribute | MergeEffect::Refined) {
            retire_gap_targets(state, &obs.skill, obs.attribute, report);
        }
    }
}

/// Remove a now-known attribute from every open gap targeting the skill;
/// gaps whose targets are exhausted resolve.
fn retire_gap_targets(
    state: &mut SessionState,
    skill: &str,
    attribute: SkillAttribute,
    report: &mut TurnReport,
) {
    for gap in &mut state.gaps {
        if gap.status.is_terminal() {
            continue;
        }
        let targets_skill = matches!(&gap.kind, GapKind::Skill { skill: gap_skill }
            if gap_skill.eq_ignore_ascii_case(skill));
        if !targets_skill {
            continue;
        }
        gap.targets_attributes.remove(&attribute);
        if gap.targets_attributes.is_empty() && gap.resolve().is_ok() {
            report.gaps_resolved.push(gap.id);
            tracing::debug!(gap_id = %gap.id, skill, "gap resolved: all target attributes filled");
        }
    }
}

/// Mark other predefined gaps covered by this answer.
fn apply_coverage(state: &mut SessionState, coverage: &[CoverageHit], config: &InterviewConfig) {
    for hit in coverage {
        if !hit.covered || hit.confidence < config.coverage_mark_confidence {
            continue;
        }
        let Some(gap) = state.gap_mut(hit.gap_id) else {
            continue;
        };
        if gap.status.is_terminal() {
            continue;
        }
        if let GapKind::Predefined {
            interview_filled,
            interview_evidence,
            coverage_confidence,
            ..
        } = &mut gap.kind
        {
            *interview_filled = true;
            *interview_evidence = Some(hit.evidence.clone());
            *coverage_confidence = hit.confidence;
            tracing::debug!(
                gap_id = %hit.gap_id,
                confidence = hit.confidence,
                "gap covered by cross-gap analysis"
            );
        }
    }
}

/// Boost the severity of gaps for skills the candidate volunteered without
/// being asked, so the conversation follows their lead.
fn boost_unprompted_skills(state: &mut SessionState, report: &TurnReport, config: &InterviewConfig) {
    if state.mode != InterviewMode::DynamicGap || report.new_attributes.is_empty() {
        return;
    }
    let asked = state
        .current_question
        .as_ref()
        .and_then(|q| q.skill_name.clone())
        .unwrap_or_default()
        .to_lowercase();

    let unprompted: Vec<&String> = report
        .new_attributes
        .keys()
        .filter(|name| **name != asked)
        .collect();
    if unprompted.is_empty() {
        return;
    }

    for gap in &mut state.gaps {
        if gap.status.is_terminal() {
            continue;
        }
        let GapKind::Skill { skill } = &gap.kind else {
            continue;
        };
        if unprompted.iter().any(|name| skill.eq_ignore_ascii_case(name)) {
            let old = gap.severity;
            gap.severity = (gap.severity + config.severity_boost).min(1.0);
            tracing::debug!(
                gap_id = %gap.id,
                skill,
                old_severity = old,
                new_severity = gap.severity,
                "boosted gap for volunteered skill"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use vetta_types::gap::{Gap, GapStatus, PredefinedQuestion};
    use vetta_types::message::{AnswerType, EngagementLevel};
    use vetta_types::session::QuestionContext;

    fn config() -> InterviewConfig {
        InterviewConfig::default()
    }

    fn engagement(answer_type: AnswerType, level: EngagementLevel, detail: u8) -> EngagementAssessment {
        EngagementAssessment {
            answer_type,
            engagement_level: level,
            detail_score: detail,
            relevance_score: 0.8,
            enthusiasm: false,
            reasoning: String::new(),
        }
    }

    fn signals(answer_type: AnswerType, detail: u8, observations: Vec<SkillObservation>) -> TurnSignals {
        TurnSignals {
            answer_text: "answer".to_string(),
            interpretation: Interpretation {
                answer_type,
                literal_facts: vec![],
            },
            engagement: engagement(answer_type, EngagementLevel::Engaged, detail),
            criteria: None,
            observations,
            coverage: vec![],
            skip_reason: None,
        }
    }

    fn obs(skill: &str, attribute: SkillAttribute, value: &str) -> SkillObservation {
        SkillObservation {
            skill: skill.to_string(),
            attribute,
            value: value.to_string(),
            correction: false,
            evidence: None,
            confidence: 1.0,
        }
    }

    fn dynamic_state_with_gap(skill: &str, attrs: &[SkillAttribute]) -> (SessionState, Uuid) {
        let mut state = SessionState::new("cand", InterviewMode::DynamicGap, 0.9, None);
        let missing: BTreeSet<SkillAttribute> = attrs.iter().copied().collect();
        let mut gap = Gap::for_skill(skill, missing, 0.9, 3);
        gap.begin_probe().unwrap();
        let gap_id = gap.id;
        state.gaps.push(gap);
        state.current_gap_id = Some(gap_id);
        state.current_question = Some(QuestionContext {
            question_text: format!("Tell me about {skill}"),
            gap_id,
            gap_description: format!("Missing info for {skill}"),
            skill_name: Some(skill.to_string()),
            attribute: attrs.first().copied(),
            category: None,
            criteria: vec![],
        });
        (state, gap_id)
    }

    #[test]
    fn test_multi_attribute_answer_resolves_gap() {
        let (mut state, gap_id) = dynamic_state_with_gap(
            "Python",
            &[SkillAttribute::Duration, SkillAttribute::Autonomy, SkillAttribute::Scale],
        );
        let signals = signals(
            AnswerType::DirectAnswer,
            2, // below quality threshold: resolution must come from attributes
            vec![
                obs("Python", SkillAttribute::Duration, "5 years"),
                obs("Python", SkillAttribute::Autonomy, "led a team of 10"),
                obs("Python", SkillAttribute::Scale, "100,000 users"),
            ],
        );

        let report = apply(&mut state, &signals, &config());
        assert!(report.gaps_resolved.contains(&gap_id));
        assert!(report.current_gap_resolved);
        assert_eq!(state.gap(gap_id).unwrap().status, GapStatus::Resolved);
        assert_eq!(state.skills.get("python").unwrap().known_attribute_count(), 3);
    }

    #[test]
    fn test_quality_alone_resolves_current_gap() {
        let (mut state, gap_id) =
            dynamic_state_with_gap("Python", &[SkillAttribute::Duration, SkillAttribute::Depth]);
        // Good answer, nothing extracted: the OR rule still resolves it.
        let signals = signals(AnswerType::DirectAnswer, 4, vec![]);
        let report = apply(&mut state, &signals, &config());
        assert!(report.current_gap_resolved);
        assert_eq!(state.gap(gap_id).unwrap().status, GapStatus::Resolved);
    }

    #[test]
    fn test_answer_quality_or_detail_resolves() {
        // Predefined-mode shape: answer_quality 4, detail 2.
        let mut state = SessionState::new("cand", InterviewMode::PredefinedQuestions, 0.6, None);
        let mut gap = Gap::from_predefined(
            &PredefinedQuestion {
                id: Uuid::now_v7(),
                category: "LEADERSHIP".to_string(),
                question_text: "Tell me about a team you led.".to_string(),
                what_assesses: vec!["People leadership".to_string()],
                expected_answer_pattern: None,
                is_required: true,
                order: 1,
            },
            2,
        );
        gap.begin_probe().unwrap();
        let gap_id = gap.id;
        state.gaps.push(gap);
        state.current_gap_id = Some(gap_id);

        let mut s = signals(AnswerType::DirectAnswer, 2, vec![]);
        s.criteria = Some(CriteriaAssessment {
            answer_quality: 4,
            criteria: vec![],
            reasoning: String::new(),
        });

        let report = apply(&mut state, &s, &config());
        assert_eq!(report.quality_signal, 4);
        assert!(report.current_gap_resolved);
        assert_eq!(state.gap(gap_id).unwrap().status, GapStatus::Resolved);
    }

    #[test]
    fn test_observation_updates_other_gaps_same_turn() {
        let (mut state, current_id) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        let other_missing: BTreeSet<SkillAttribute> = [SkillAttribute::Duration].into_iter().collect();
        let other = Gap::for_skill("React", other_missing, 0.8, 3);
        let other_id = other.id;
        state.gaps.push(other);

        let signals = signals(
            AnswerType::DirectAnswer,
            2,
            vec![
                obs("Python", SkillAttribute::Duration, "3 years"),
                obs("React", SkillAttribute::Duration, "3 years"),
            ],
        );
        let report = apply(&mut state, &signals, &config());

        // Both gaps resolved by one answer.
        assert!(report.gaps_resolved.contains(&current_id));
        assert!(report.gaps_resolved.contains(&other_id));
        assert_eq!(state.gap(other_id).unwrap().status, GapStatus::Resolved);
    }

    #[test]
    fn test_skip_leaves_counter_and_marks_gap() {
        let (mut state, gap_id) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        state.engagement.consecutive_low_quality = 2;
        let mut s = signals(AnswerType::PartialAnswer, 1, vec![]);
        s.skip_reason = Some("no experience".to_string());

        apply(&mut state, &s, &config());
        assert_eq!(state.engagement.consecutive_low_quality, 2);
        assert_eq!(state.engagement.questions_skipped, 1);
        assert_eq!(state.gap(gap_id).unwrap().status, GapStatus::Skipped);
    }

    #[test]
    fn test_disengaged_answer_increments_counter() {
        let (mut state, _) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        let mut s = signals(AnswerType::PartialAnswer, 1, vec![]);
        s.engagement.engagement_level = EngagementLevel::Disengaged;
        apply(&mut state, &s, &config());
        assert_eq!(state.engagement.consecutive_low_quality, 1);
    }

    #[test]
    fn test_clarification_resets_counter() {
        let (mut state, _) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        state.engagement.consecutive_low_quality = 2;
        let s = signals(AnswerType::ClarificationRequest, 1, vec![]);
        apply(&mut state, &s, &config());
        assert_eq!(state.engagement.consecutive_low_quality, 0);
    }

    #[test]
    fn test_coverage_marks_other_predefined_gap() {
        let mut state = SessionState::new("cand", InterviewMode::PredefinedQuestions, 0.6, None);
        let other = Gap::from_predefined(
            &PredefinedQuestion {
                id: Uuid::now_v7(),
                category: "SYSTEM DESIGN".to_string(),
                question_text: "Describe a system you designed.".to_string(),
                what_assesses: vec!["Design thinking".to_string()],
                expected_answer_pattern: None,
                is_required: false,
                order: 2,
            },
            2,
        );
        let other_id = other.id;
        state.gaps.push(other);

        let mut s = signals(AnswerType::DirectAnswer, 4, vec![]);
        s.coverage = vec![CoverageHit {
            gap_id: other_id,
            covered: true,
            confidence: 0.85,
            evidence: "designed the ingest pipeline".to_string(),
        }];
        apply(&mut state, &s, &config());

        match &state.gap(other_id).unwrap().kind {
            GapKind::Predefined {
                interview_filled,
                coverage_confidence,
                ..
            } => {
                assert!(*interview_filled);
                assert!((*coverage_confidence - 0.85).abs() < f64::EPSILON);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_low_confidence_coverage_ignored() {
        let mut state = SessionState::new("cand", InterviewMode::PredefinedQuestions, 0.6, None);
        let other = Gap::from_predefined(
            &PredefinedQuestion {
                id: Uuid::now_v7(),
                category: "C".to_string(),
                question_text: "Q?".to_string(),
                what_assesses: vec![],
                expected_answer_pattern: None,
                is_required: false,
                order: 1,
            },
            2,
        );
        let other_id = other.id;
        state.gaps.push(other);

        let mut s = signals(AnswerType::DirectAnswer, 4, vec![]);
        s.coverage = vec![CoverageHit {
            gap_id: other_id,
            covered: true,
            confidence: 0.5,
            evidence: String::new(),
        }];
        apply(&mut state, &s, &config());

        match &state.gap(other_id).unwrap().kind {
            GapKind::Predefined { interview_filled, .. } => assert!(!interview_filled),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_unprompted_skill_boosts_severity() {
        let (mut state, _) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        let missing: BTreeSet<SkillAttribute> =
            [SkillAttribute::Depth, SkillAttribute::Scale].into_iter().collect();
        let docker = Gap::for_skill("Docker", missing, 0.5, 3);
        let docker_id = docker.id;
        let old_severity = docker.severity;
        state.gaps.push(docker);

        let signals = signals(
            AnswerType::DirectAnswer,
            2,
            vec![obs("Docker", SkillAttribute::Duration, "2 years")],
        );
        apply(&mut state, &signals, &config());

        let boosted = state.gap(docker_id).unwrap().severity;
        assert!((boosted - (old_severity + 0.2)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completeness_never_decreases() {
        let (mut state, _) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        state.completeness_score = 0.5;

        // New skill with one attribute would compute a lower raw coverage;
        // the committed score must not drop.
        let signals = signals(
            AnswerType::DirectAnswer,
            2,
            vec![obs("Kubernetes", SkillAttribute::Duration, "1 year")],
        );
        apply(&mut state, &signals, &config());
        assert!(state.completeness_score >= 0.5);
    }

    #[test]
    fn test_answer_appended_with_metadata() {
        let (mut state, gap_id) = dynamic_state_with_gap("Python", &[SkillAttribute::Duration]);
        let signals = signals(
            AnswerType::DirectAnswer,
            4,
            vec![obs("Python", SkillAttribute::Duration, "3 years")],
        );
        apply(&mut state, &signals, &config());

        let last = state.history.last().unwrap();
        match &last.meta {
            Some(vetta_types::message::MessageMeta::Answer(meta)) => {
                assert_eq!(meta.gap_id, Some(gap_id));
                assert!(meta.gap_resolved);
                assert_eq!(meta.skills_extracted, vec!["Python".to_string()]);
            }
            _ => unreachable!("expected answer metadata"),
        }
    }
}
