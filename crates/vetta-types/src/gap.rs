//! Gaps: units of missing candidate information.
//!
//! A gap is either a skill gap (dynamic-gap mode, targeting the missing
//! attributes of one extracted skill) or a predefined question (predefined
//! mode, carrying its assessment criteria and coverage flags). Gap status
//! moves strictly forward: open -> probing -> resolved | skipped. Terminal
//! states reject further transitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::message::AnswerType;
use crate::skill::SkillAttribute;

/// Lifecycle status of a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapStatus {
    Open,
    Probing,
    Resolved,
    Skipped,
}

impl GapStatus {
    /// Resolved and skipped gaps never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GapStatus::Resolved | GapStatus::Skipped)
    }
}

impl fmt::Display for GapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapStatus::Open => write!(f, "open"),
            GapStatus::Probing => write!(f, "probing"),
            GapStatus::Resolved => write!(f, "resolved"),
            GapStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Attempted transition out of a terminal gap status.
#[derive(Debug, thiserror::Error)]
#[error("gap {gap_id} is {status} and cannot transition to {requested}")]
pub struct GapTransitionError {
    pub gap_id: Uuid,
    pub status: GapStatus,
    pub requested: GapStatus,
}

/// Mode-specific gap payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GapKind {
    /// Dynamic-gap mode: missing attributes for one named skill.
    Skill { skill: String },

    /// Predefined mode: one question from a fixed question set.
    Predefined {
        question_id: Uuid,
        question_text: String,
        criteria: Vec<String>,
        is_required: bool,
        order: u32,
        /// The resume already answers this question (detected at start).
        resume_filled: bool,
        resume_evidence: Option<String>,
        /// A previous answer covered this question (cross-gap detection).
        interview_filled: bool,
        interview_evidence: Option<String>,
        coverage_confidence: f64,
        skip_reason: Option<String>,
    },
}

/// A predefined interview question supplied by the caller at `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredefinedQuestion {
    pub id: Uuid,
    pub category: String,
    pub question_text: String,
    pub what_assesses: Vec<String>,
    #[serde(default)]
    pub expected_answer_pattern: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub order: u32,
}

/// A unit of missing information the interview aims to fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: Uuid,
    pub description: String,
    pub category: String,
    /// 0.0-1.0, higher means more important to resolve.
    pub severity: f64,
    pub status: GapStatus,
    /// Skill attributes still missing (skill gaps only).
    pub targets_attributes: BTreeSet<SkillAttribute>,
    pub probes_attempted: u32,
    pub max_probes: u32,
    /// Answer types received while probing this gap, oldest first.
    pub probe_history: Vec<AnswerType>,
    pub kind: GapKind,
}

impl Gap {
    /// Build a skill gap from the attributes still missing after resume
    /// analysis.
    ///
    /// Severity follows the number of unknowns and the extraction
    /// confidence: three or more unknowns on a high-confidence skill rank
    /// highest.
    pub fn for_skill(
        skill: &str,
        missing: BTreeSet<SkillAttribute>,
        confidence: f64,
        max_probes: u32,
    ) -> Self {
        let names: Vec<String> = missing.iter().map(|a| a.to_string()).collect();
        let severity = if missing.len() >= 3 && confidence >= 0.7 {
            0.9
        } else if missing.len() >= 2 {
            0.6
        } else {
            0.3
        };

        Self {
            id: Uuid::now_v7(),
            description: format!("Missing {} for {skill}", names.join(", ")),
            category: "technical_skill".to_string(),
            severity,
            status: GapStatus::Open,
            targets_attributes: missing,
            probes_attempted: 0,
            max_probes,
            probe_history: Vec::new(),
            kind: GapKind::Skill {
                skill: skill.to_string(),
            },
        }
    }

    /// Build a predefined-question gap. Required questions rank above
    /// optional ones.
    pub fn from_predefined(question: &PredefinedQuestion, max_probes: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            description: question.question_text.clone(),
            category: question.category.clone(),
            severity: if question.is_required { 1.0 } else { 0.5 },
            status: GapStatus::Open,
            targets_attributes: BTreeSet::new(),
            probes_attempted: 0,
            max_probes,
            probe_history: Vec::new(),
            kind: GapKind::Predefined {
                question_id: question.id,
                question_text: question.question_text.clone(),
                criteria: question.what_assesses.clone(),
                is_required: question.is_required,
                order: question.order,
                resume_filled: false,
                resume_evidence: None,
                interview_filled: false,
                interview_evidence: None,
                coverage_confidence: 0.0,
                skip_reason: None,
            },
        }
    }

    /// The skill this gap targets, if it is a skill gap.
    pub fn skill_name(&self) -> Option<&str> {
        match &self.kind {
            GapKind::Skill { skill } => Some(skill),
            GapKind::Predefined { .. } => None,
        }
    }

    /// Assessment criteria, for predefined gaps.
    pub fn criteria(&self) -> &[String] {
        match &self.kind {
            GapKind::Predefined { criteria, .. } => criteria,
            GapKind::Skill { .. } => &[],
        }
    }

    /// Begin (or continue) probing this gap, counting one question asked.
    pub fn begin_probe(&mut self) -> Result<(), GapTransitionError> {
        if self.status.is_terminal() {
            return Err(GapTransitionError {
                gap_id: self.id,
                status: self.status,
                requested: GapStatus::Probing,
            });
        }
        self.status = GapStatus::Probing;
        self.probes_attempted += 1;
        Ok(())
    }

    /// Mark this gap resolved. Resolved gaps are never reopened.
    pub fn resolve(&mut self) -> Result<(), GapTransitionError> {
        if self.status.is_terminal() {
            return Err(GapTransitionError {
                gap_id: self.id,
                status: self.status,
                requested: GapStatus::Resolved,
            });
        }
        self.status = GapStatus::Resolved;
        Ok(())
    }

    /// Mark this gap skipped (probe budget exhausted or explicit user skip).
    pub fn skip(&mut self, reason: Option<String>) -> Result<(), GapTransitionError> {
        if self.status.is_terminal() {
            return Err(GapTransitionError {
                gap_id: self.id,
                status: self.status,
                requested: GapStatus::Skipped,
            });
        }
        self.status = GapStatus::Skipped;
        if let GapKind::Predefined { skip_reason, .. } = &mut self.kind {
            *skip_reason = reason;
        }
        Ok(())
    }

    /// Record the answer type of the latest probe response.
    pub fn record_answer(&mut self, answer_type: AnswerType) {
        self.probe_history.push(answer_type);
    }

    /// Effective probe budget, adjusted from recent probe history.
    ///
    /// - Three clarification requests in a row: the candidate is trying,
    ///   extend the budget by two.
    /// - Two off-topic answers in a row: the candidate does not have this
    ///   information, stop now.
    /// - Two partial answers in a row: tighten by one (floor of two).
    pub fn effective_max_probes(&self) -> u32 {
        let history = &self.probe_history;
        if history.len() >= 3
            && history[history.len() - 3..]
                .iter()
                .all(|t| *t == AnswerType::ClarificationRequest)
        {
            return self.max_probes + 2;
        }
        if history.len() >= 2
            && history[history.len() - 2..]
                .iter()
                .all(|t| *t == AnswerType::OffTopic)
        {
            return self.probes_attempted;
        }
        if history.len() >= 2
            && history[history.len() - 2..]
                .iter()
                .all(|t| *t == AnswerType::PartialAnswer)
        {
            return self.max_probes.saturating_sub(1).max(2);
        }
        self.max_probes
    }

    /// Whether this gap can still be asked about.
    pub fn is_askable(&self) -> bool {
        !self.status.is_terminal() && self.probes_attempted < self.effective_max_probes()
    }
}
