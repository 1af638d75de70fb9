//! Exit and routing decisions.
//!
//! Everything here is a pure function over an immutable state snapshot plus
//! the current turn's signals. The orchestrator applies the state updates
//! (see `turn`), then asks this module what to do next: probe the current
//! gap again, advance to the next gap, or terminate the interview.
//!
//! The state machine:
//!
//! ```text
//! ASK_NEXT_GAP -> PROBE_CURRENT_GAP -> (resolved)            -> ASK_NEXT_GAP
//!                                   -> (unresolved, budget)  -> PROBE_CURRENT_GAP
//!                                   -> (exhausted)           -> SKIP_GAP -> ASK_NEXT_GAP
//! any state -> (threshold reached | no gaps | disengaged)    -> TERMINATED
//! ```

use uuid::Uuid;

use vetta_types::assessment::{CriteriaAssessment, EngagementAssessment};
use vetta_types::config::InterviewConfig;
use vetta_types::gap::{Gap, GapKind};
use vetta_types::message::AnswerType;
use vetta_types::session::{InterviewMode, SessionState, TerminationReason};

/// What the turn does after the state updates are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Ask a follow-up on the same gap.
    FollowUp { gap_id: Uuid },
    /// Move on and ask about the given gap.
    NextGap { gap_id: Uuid },
    /// End the interview.
    Terminate { reason: TerminationReason },
}

/// Combined quality signal across the two scoring paths.
///
/// Taking the max implements the OR-combination used for gap resolution:
/// `detail_score >= 3 || answer_quality >= 3` is exactly
/// `quality_signal >= 3`, so neither scoring path alone can produce a false
/// negative.
pub fn quality_signal(
    engagement: &EngagementAssessment,
    criteria: Option<&CriteriaAssessment>,
) -> u8 {
    let answer_quality = criteria.map(|c| c.answer_quality).unwrap_or(0);
    engagement.detail_score.max(answer_quality)
}

/// Gaps that can still be asked about, split into the main pool and the
/// low-confidence pre-filled pool (predefined mode only).
#[derive(Debug, Default)]
pub struct AskableGaps<'a> {
    pub primary: Vec<&'a Gap>,
    /// Interview-filled below the skip-confidence bar: eligible for a short
    /// confirmation follow-up once the main pool is empty.
    pub low_confidence: Vec<&'a Gap>,
}

impl AskableGaps<'_> {
    pub fn total(&self) -> usize {
        self.primary.len() + self.low_confidence.len()
    }
}

/// Partition the session's gaps into askable pools.
pub fn askable_gaps<'a>(state: &'a SessionState, config: &InterviewConfig) -> AskableGaps<'a> {
    let mut pools = AskableGaps::default();
    for gap in &state.gaps {
        if !gap.is_askable() {
            continue;
        }
        if let GapKind::Predefined {
            resume_filled,
            interview_filled,
            coverage_confidence,
            ..
        } = &gap.kind
        {
            if *resume_filled {
                continue;
            }
            if *interview_filled {
                if *coverage_confidence >= config.coverage_skip_confidence {
                    continue;
                }
                pools.low_confidence.push(gap);
                continue;
            }
        }
        pools.primary.push(gap);
    }
    pools
}

/// Pick the next gap to ask about: highest severity from the main pool,
/// falling back to the least-certain pre-filled gap. Ties keep creation
/// order.
pub fn select_gap(state: &SessionState, config: &InterviewConfig) -> Option<Uuid> {
    let pools = askable_gaps(state, config);
    if let Some(best) = pools
        .primary
        .iter()
        .copied()
        .reduce(|best, gap| if gap.severity > best.severity { gap } else { best })
    {
        return Some(best.id);
    }
    pools
        .low_confidence
        .iter()
        .copied()
        .reduce(|best, gap| {
            if confidence_of(gap) < confidence_of(best) {
                gap
            } else {
                best
            }
        })
        .map(|g| g.id)
}

fn confidence_of(gap: &Gap) -> f64 {
    match &gap.kind {
        GapKind::Predefined {
            coverage_confidence, ..
        } => *coverage_confidence,
        GapKind::Skill { .. } => 0.0,
    }
}

/// Whether to probe the current gap again.
///
/// A clarification request always earns a follow-up while probe budget
/// remains. Otherwise: the gap is still unresolved, the candidate is not
/// sliding toward disengagement, and the last quality signal was below the
/// acceptance threshold.
pub fn should_follow_up(
    gap: &Gap,
    answer_type: AnswerType,
    quality: u8,
    consecutive_low_quality: u32,
    config: &InterviewConfig,
) -> bool {
    if gap.status.is_terminal() {
        return false;
    }
    if gap.probes_attempted >= gap.effective_max_probes() {
        return false;
    }
    if answer_type == AnswerType::ClarificationRequest {
        return true;
    }
    quality < config.quality_threshold
        && consecutive_low_quality < config.disengagement_limit
}

/// Global exit condition. Returns the termination reason, or None to
/// continue.
///
/// Disengagement dominates; then gap exhaustion; then (dynamic mode only)
/// the completeness threshold. Predefined mode tracks completeness but only
/// stops on exhaustion or disengagement.
pub fn continue_or_terminate(
    state: &SessionState,
    config: &InterviewConfig,
) -> Option<TerminationReason> {
    if state.engagement.consecutive_low_quality >= config.disengagement_limit {
        return Some(TerminationReason::Disengaged);
    }
    if askable_gaps(state, config).total() == 0 {
        return Some(TerminationReason::NoGaps);
    }
    if state.mode == InterviewMode::DynamicGap
        && state.completeness_score >= state.minimum_completeness
    {
        return Some(TerminationReason::Complete);
    }
    None
}

/// The full routing decision for one answered turn.
///
/// Assumes the turn's state updates (resolution, counters, skip marking)
/// have already been applied to `state`.
pub fn route(
    state: &SessionState,
    answer_type: AnswerType,
    quality: u8,
    skip_requested: bool,
    config: &InterviewConfig,
) -> RouteOutcome {
    if !skip_requested {
        if let Some(gap) = state.current_gap() {
            if should_follow_up(
                gap,
                answer_type,
                quality,
                state.engagement.consecutive_low_quality,
                config,
            ) {
                return RouteOutcome::FollowUp { gap_id: gap.id };
            }
        }
    }

    if let Some(reason) = continue_or_terminate(state, config) {
        return RouteOutcome::Terminate { reason };
    }

    match select_gap(state, config) {
        Some(gap_id) => RouteOutcome::NextGap { gap_id },
        // continue_or_terminate said gaps remain; this is unreachable in
        // practice but terminates cleanly rather than panicking.
        None => RouteOutcome::Terminate {
            reason: TerminationReason::NoGaps,
        },
    }
}

/// Mode-aware completeness.
///
/// Dynamic mode: known skill attributes over total attributes. Predefined
/// mode: covered questions (resolved, resume-filled, or interview-filled)
/// over non-skipped questions -- explicitly skipped questions leave both
/// sides of the ratio.
pub fn completeness(state: &SessionState) -> f64 {
    match state.mode {
        InterviewMode::DynamicGap => state.skills.attribute_coverage(),
        InterviewMode::PredefinedQuestions => {
            let mut total = 0usize;
            let mut covered = 0usize;
            for gap in &state.gaps {
                let GapKind::Predefined {
                    resume_filled,
                    interview_filled,
                    ..
                } = &gap.kind
                else {
                    continue;
                };
                if gap.status == vetta_types::gap::GapStatus::Skipped {
                    continue;
                }
                total += 1;
                if gap.status == vetta_types::gap::GapStatus::Resolved
                    || *resume_filled
                    || *interview_filled
                {
                    covered += 1;
                }
            }
            if total == 0 {
                0.0
            } else {
                covered as f64 / total as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use vetta_types::gap::PredefinedQuestion;
    use vetta_types::message::EngagementLevel;
    use vetta_types::skill::SkillAttribute;

    fn config() -> InterviewConfig {
        InterviewConfig::default()
    }

    fn engagement(detail: u8) -> EngagementAssessment {
        EngagementAssessment {
            answer_type: AnswerType::DirectAnswer,
            engagement_level: EngagementLevel::Engaged,
            detail_score: detail,
            relevance_score: 0.8,
            enthusiasm: false,
            reasoning: String::new(),
        }
    }

    fn criteria(quality: u8) -> CriteriaAssessment {
        CriteriaAssessment {
            answer_quality: quality,
            criteria: vec![],
            reasoning: String::new(),
        }
    }

    fn skill_gap(skill: &str, severity_attrs: usize) -> Gap {
        let missing: BTreeSet<SkillAttribute> = SkillAttribute::ALL
            .into_iter()
            .take(severity_attrs)
            .collect();
        Gap::for_skill(skill, missing, 0.9, 3)
    }

    fn dynamic_state() -> SessionState {
        SessionState::new("cand", InterviewMode::DynamicGap, 0.9, None)
    }

    fn predefined_state() -> SessionState {
        SessionState::new("cand", InterviewMode::PredefinedQuestions, 0.6, None)
    }

    fn predefined_gap(order: u32) -> Gap {
        Gap::from_predefined(
            &PredefinedQuestion {
                id: Uuid::now_v7(),
                category: format!("CATEGORY {order}"),
                question_text: format!("Question {order}?"),
                what_assesses: vec!["criterion".to_string()],
                expected_answer_pattern: None,
                is_required: true,
                order,
            },
            2,
        )
    }

    #[test]
    fn test_quality_signal_is_or_combination() {
        // answer_quality 4 with detail 2 passes the threshold (OR, not AND)
        assert_eq!(quality_signal(&engagement(2), Some(&criteria(4))), 4);
        // detail 4 with answer_quality 2 also passes
        assert_eq!(quality_signal(&engagement(4), Some(&criteria(2))), 4);
        // no criteria path: detail alone
        assert_eq!(quality_signal(&engagement(3), None), 3);
    }

    #[test]
    fn test_select_gap_prefers_severity() {
        let mut state = dynamic_state();
        state.gaps.push(skill_gap("SQL", 1)); // severity 0.3
        state.gaps.push(skill_gap("Python", 4)); // severity 0.9
        let selected = select_gap(&state, &config()).unwrap();
        assert_eq!(selected, state.gaps[1].id);
    }

    #[test]
    fn test_select_gap_skips_exhausted() {
        let mut state = dynamic_state();
        let mut gap = skill_gap("Python", 4);
        for _ in 0..3 {
            gap.begin_probe().unwrap();
        }
        state.gaps.push(gap);
        state.gaps.push(skill_gap("SQL", 1));
        let selected = select_gap(&state, &config()).unwrap();
        assert_eq!(selected, state.gaps[1].id);
    }

    #[test]
    fn test_predefined_filters() {
        let mut state = predefined_state();
        let mut resume_filled = predefined_gap(1);
        if let GapKind::Predefined { resume_filled: rf, .. } = &mut resume_filled.kind {
            *rf = true;
        }
        let mut high_conf = predefined_gap(2);
        if let GapKind::Predefined {
            interview_filled,
            coverage_confidence,
            ..
        } = &mut high_conf.kind
        {
            *interview_filled = true;
            *coverage_confidence = 0.95;
        }
        let mut low_conf = predefined_gap(3);
        if let GapKind::Predefined {
            interview_filled,
            coverage_confidence,
            ..
        } = &mut low_conf.kind
        {
            *interview_filled = true;
            *coverage_confidence = 0.75;
        }
        let open = predefined_gap(4);

        state.gaps = vec![resume_filled, high_conf, low_conf.clone(), open.clone()];
        let pools = askable_gaps(&state, &config());
        assert_eq!(pools.primary.len(), 1);
        assert_eq!(pools.primary[0].id, open.id);
        assert_eq!(pools.low_confidence.len(), 1);
        assert_eq!(pools.low_confidence[0].id, low_conf.id);

        // With the main pool empty, the low-confidence gap is selected.
        state.gaps.retain(|g| g.id != open.id);
        assert_eq!(select_gap(&state, &config()), Some(low_conf.id));
    }

    #[test]
    fn test_follow_up_on_clarification() {
        let gap = skill_gap("Python", 4);
        assert!(should_follow_up(
            &gap,
            AnswerType::ClarificationRequest,
            5,
            0,
            &config()
        ));
    }

    #[test]
    fn test_follow_up_on_low_quality() {
        let gap = skill_gap("Python", 4);
        assert!(should_follow_up(&gap, AnswerType::PartialAnswer, 2, 0, &config()));
        // acceptable quality: no follow-up
        assert!(!should_follow_up(&gap, AnswerType::PartialAnswer, 3, 0, &config()));
        // near disengagement: no follow-up
        assert!(!should_follow_up(&gap, AnswerType::PartialAnswer, 2, 3, &config()));
    }

    #[test]
    fn test_follow_up_respects_probe_budget() {
        let mut gap = skill_gap("Python", 4);
        for _ in 0..3 {
            gap.begin_probe().unwrap();
        }
        assert!(!should_follow_up(
            &gap,
            AnswerType::ClarificationRequest,
            1,
            0,
            &config()
        ));
    }

    #[test]
    fn test_terminate_disengaged_beats_open_gaps() {
        let mut state = dynamic_state();
        state.gaps.push(skill_gap("Python", 4));
        state.engagement.consecutive_low_quality = 3;
        assert_eq!(
            continue_or_terminate(&state, &config()),
            Some(TerminationReason::Disengaged)
        );
    }

    #[test]
    fn test_terminate_no_gaps() {
        let state = dynamic_state();
        assert_eq!(
            continue_or_terminate(&state, &config()),
            Some(TerminationReason::NoGaps)
        );
    }

    #[test]
    fn test_terminate_complete_dynamic_only() {
        let mut state = dynamic_state();
        state.gaps.push(skill_gap("Python", 4));
        state.completeness_score = 0.95;
        assert_eq!(
            continue_or_terminate(&state, &config()),
            Some(TerminationReason::Complete)
        );

        // Predefined mode keeps going past its completeness threshold.
        let mut state = predefined_state();
        state.gaps.push(predefined_gap(1));
        state.completeness_score = 0.95;
        assert_eq!(continue_or_terminate(&state, &config()), None);
    }

    #[test]
    fn test_completeness_predefined_excludes_skipped() {
        let mut state = predefined_state();
        let mut resolved = predefined_gap(1);
        resolved.resolve().unwrap();
        let mut skipped = predefined_gap(2);
        skipped.skip(Some("user_requested_skip".to_string())).unwrap();
        let open = predefined_gap(3);
        state.gaps = vec![resolved, skipped, open];

        // 1 covered of 2 counted (the skipped question leaves the ratio)
        assert!((completeness(&state) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_route_follow_up_then_terminate() {
        let mut state = dynamic_state();
        let mut gap = skill_gap("Python", 4);
        gap.begin_probe().unwrap();
        let gap_id = gap.id;
        state.gaps.push(gap);
        state.current_gap_id = Some(gap_id);

        let outcome = route(&state, AnswerType::PartialAnswer, 1, false, &config());
        assert_eq!(outcome, RouteOutcome::FollowUp { gap_id });

        // Once disengagement trips, the same inputs terminate.
        state.engagement.consecutive_low_quality = 3;
        let outcome = route(&state, AnswerType::PartialAnswer, 1, false, &config());
        assert_eq!(
            outcome,
            RouteOutcome::Terminate {
                reason: TerminationReason::Disengaged
            }
        );
    }

    #[test]
    fn test_route_skip_moves_on() {
        let mut state = predefined_state();
        let mut current = predefined_gap(1);
        current.begin_probe().unwrap();
        current.skip(Some("user_requested_skip".to_string())).unwrap();
        let next = predefined_gap(2);
        let next_id = next.id;
        state.current_gap_id = Some(current.id);
        state.gaps = vec![current, next];

        let outcome = route(&state, AnswerType::PartialAnswer, 1, true, &config());
        assert_eq!(outcome, RouteOutcome::NextGap { gap_id: next_id });
    }
}
