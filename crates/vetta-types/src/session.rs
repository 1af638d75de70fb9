//! Interview session state: the serializable record of one interview thread.
//!
//! `SessionState` is the checkpoint unit. The orchestrator loads it at the
//! start of a turn, mutates a working copy, and persists the whole snapshot
//! atomically at the end of the turn. Once `status` leaves `Active` the
//! state is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::gap::{Gap, GapStatus};
use crate::message::TurnMessage;
use crate::skill::{SkillAttribute, SkillSet};

/// How questions are selected, fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewMode {
    /// Question selection driven by live skill-gap analysis.
    DynamicGap,
    /// Question selection driven by a fixed, ordered question set.
    PredefinedQuestions,
}

impl fmt::Display for InterviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterviewMode::DynamicGap => write!(f, "dynamic_gap"),
            InterviewMode::PredefinedQuestions => write!(f, "predefined_questions"),
        }
    }
}

impl FromStr for InterviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dynamic_gap" => Ok(InterviewMode::DynamicGap),
            "predefined_questions" => Ok(InterviewMode::PredefinedQuestions),
            other => Err(format!("invalid interview mode: '{other}'")),
        }
    }
}

/// Lifecycle status of an interview session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

/// Why a terminated interview ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Completeness threshold reached.
    Complete,
    /// The candidate stopped meaningfully participating.
    Disengaged,
    /// No askable gaps remain.
    NoGaps,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Complete => write!(f, "complete"),
            TerminationReason::Disengaged => write!(f, "disengaged"),
            TerminationReason::NoGaps => write!(f, "no_gaps"),
        }
    }
}

impl FromStr for TerminationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "complete" => Ok(TerminationReason::Complete),
            "disengaged" => Ok(TerminationReason::Disengaged),
            "no_gaps" => Ok(TerminationReason::NoGaps),
            other => Err(format!("invalid termination reason: '{other}'")),
        }
    }
}

/// Engagement counters tracked across the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounters {
    /// Consecutive answers assessed as low quality. Reset by any engaged
    /// answer or clarification request.
    pub consecutive_low_quality: u32,
    pub questions_asked: u32,
    pub questions_answered: u32,
    pub questions_skipped: u32,
}

/// Explicit context for the question currently awaiting an answer.
///
/// Saved when the question is generated so the next turn can interpret the
/// answer with the exact skill/attribute or criteria that were targeted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContext {
    pub question_text: String,
    pub gap_id: Uuid,
    pub gap_description: String,
    /// Dynamic-gap mode: the skill being asked about.
    pub skill_name: Option<String>,
    /// Dynamic-gap mode: the primary attribute being probed.
    pub attribute: Option<SkillAttribute>,
    /// Predefined mode: question category.
    pub category: Option<String>,
    /// Predefined mode: assessment criteria.
    pub criteria: Vec<String>,
}

/// The complete state of one interview thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub thread_id: Uuid,
    pub candidate_id: String,
    pub mode: InterviewMode,
    /// ISO 639-1 code for user-facing output; None means English.
    pub language: Option<String>,
    /// Derived facts from the initial resume, immutable after creation.
    pub resume_summary: String,
    /// Gaps in creation order. Entries mutate in place; the order never
    /// changes and entries are never removed.
    pub gaps: Vec<Gap>,
    pub skills: SkillSet,
    pub engagement: EngagementCounters,
    /// 0.0-1.0, monotonically non-decreasing while the session is active.
    pub completeness_score: f64,
    pub minimum_completeness: f64,
    pub status: SessionStatus,
    pub termination_reason: Option<TerminationReason>,
    pub current_gap_id: Option<Uuid>,
    pub current_question: Option<QuestionContext>,
    /// Append-only conversation history.
    pub history: Vec<TurnMessage>,
    /// Recent question-opening phrases, tracked to avoid repetition.
    pub recent_transitions: Vec<String>,
    /// Incremented once per committed turn; used for conflict detection in
    /// checkpoint stores.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(
        candidate_id: impl Into<String>,
        mode: InterviewMode,
        minimum_completeness: f64,
        language: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::now_v7(),
            thread_id: Uuid::now_v7(),
            candidate_id: candidate_id.into(),
            mode,
            language,
            resume_summary: String::new(),
            gaps: Vec::new(),
            skills: SkillSet::new(),
            engagement: EngagementCounters::default(),
            completeness_score: 0.0,
            minimum_completeness,
            status: SessionStatus::Active,
            termination_reason: None,
            current_gap_id: None,
            current_question: None,
            history: Vec::new(),
            recent_transitions: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn gap(&self, id: Uuid) -> Option<&Gap> {
        self.gaps.iter().find(|g| g.id == id)
    }

    pub fn gap_mut(&mut self, id: Uuid) -> Option<&mut Gap> {
        self.gaps.iter_mut().find(|g| g.id == id)
    }

    pub fn current_gap(&self) -> Option<&Gap> {
        self.current_gap_id.and_then(|id| self.gap(id))
    }

    /// Gaps that are neither resolved nor skipped.
    pub fn open_gap_count(&self) -> usize {
        self.gaps.iter().filter(|g| !g.status.is_terminal()).count()
    }

    pub fn resolved_gap_count(&self) -> usize {
        self.gaps
            .iter()
            .filter(|g| g.status == GapStatus::Resolved)
            .count()
    }

    /// Last `n` messages of the conversation, oldest first.
    pub fn recent_window(&self, n: usize) -> &[TurnMessage] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn push_message(&mut self, message: TurnMessage) {
        self.history.push(message);
    }

    /// Raise the completeness score. Lower computed values are ignored so the
    /// score is monotonically non-decreasing while the session is active.
    pub fn raise_completeness(&mut self, score: f64) {
        if score > self.completeness_score {
            self.completeness_score = score.clamp(0.0, 1.0);
        }
    }

    /// Terminate the session. Idempotent for an already-terminal session:
    /// the first reason wins.
    pub fn terminate(&mut self, reason: TerminationReason) {
        if !self.is_active() {
            return;
        }
        self.status = SessionStatus::Completed;
        self.termination_reason = Some(reason);
        self.current_gap_id = None;
        self.current_question = None;
    }

    /// Mark the session abandoned (caller-driven, e.g. candidate walked
    /// away). Only valid from Active.
    pub fn abandon(&mut self) {
        if self.is_active() {
            self.status = SessionStatus::Abandoned;
        }
    }

    /// Remember a question-opening phrase, keeping the most recent five.
    pub fn push_transition(&mut self, phrase: String) {
        if phrase.is_empty() {
            return;
        }
        self.recent_transitions.push(phrase);
        if self.recent_transitions.len() > 5 {
            self.recent_transitions.remove(0);
        }
    }
}

/// The persisted session record: metrics, status, mode, and the thread
/// reference, kept alongside the append-only message log as the audit
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub candidate_id: String,
    pub thread_id: Uuid,
    pub mode: InterviewMode,
    pub language: Option<String>,
    pub status: SessionStatus,
    pub termination_reason: Option<TerminationReason>,
    pub questions_asked: u32,
    pub questions_answered: u32,
    pub questions_skipped: u32,
    pub completeness_score: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            id: state.session_id,
            candidate_id: state.candidate_id.clone(),
            thread_id: state.thread_id,
            mode: state.mode,
            language: state.language.clone(),
            status: state.status,
            termination_reason: state.termination_reason,
            questions_asked: state.engagement.questions_asked,
            questions_answered: state.engagement.questions_answered,
            questions_skipped: state.engagement.questions_skipped,
            completeness_score: state.completeness_score,
            created_at: state.created_at,
            completed_at: if state.is_active() {
                None
            } else {
                Some(state.updated_at)
            },
        }
    }
}
