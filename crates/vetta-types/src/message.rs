//! Conversation messages and their per-message structured metadata.
//!
//! Each turn appends two messages to the session history: the candidate's
//! answer (with assessment metadata) and the next question (with gap
//! targeting metadata). History is append-only and doubles as the audit log
//! persisted through the interview repository.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub use crate::llm::MessageRole;
use crate::skill::SkillAttribute;

/// Classification of an inbound answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    DirectAnswer,
    PartialAnswer,
    OffTopic,
    ClarificationRequest,
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerType::DirectAnswer => write!(f, "direct_answer"),
            AnswerType::PartialAnswer => write!(f, "partial_answer"),
            AnswerType::OffTopic => write!(f, "off_topic"),
            AnswerType::ClarificationRequest => write!(f, "clarification_request"),
        }
    }
}

impl FromStr for AnswerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct_answer" => Ok(AnswerType::DirectAnswer),
            "partial_answer" => Ok(AnswerType::PartialAnswer),
            "off_topic" => Ok(AnswerType::OffTopic),
            "clarification_request" => Ok(AnswerType::ClarificationRequest),
            other => Err(format!("invalid answer type: '{other}'")),
        }
    }
}

/// Whether the candidate is meaningfully participating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Engaged,
    Disengaged,
}

impl fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngagementLevel::Engaged => write!(f, "engaged"),
            EngagementLevel::Disengaged => write!(f, "disengaged"),
        }
    }
}

/// What kind of assistant turn a question message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    FirstQuestion,
    GapQuestion,
    FollowUp,
    Completion,
}

/// Metadata recorded on assistant (question) messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMeta {
    pub question_type: QuestionType,
    pub gap_id: Option<Uuid>,
    pub targets_attributes: Vec<SkillAttribute>,
    /// Sequential question number within the session, starting at 1.
    pub sequence: u32,
}

/// Metadata recorded on user (answer) messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMeta {
    pub answer_type: AnswerType,
    pub engagement_level: EngagementLevel,
    /// 1-5.
    pub detail_score: u8,
    /// 0.0-1.0.
    pub relevance_score: f64,
    pub enthusiasm: bool,
    pub gap_id: Option<Uuid>,
    pub skills_extracted: Vec<String>,
    pub gap_resolved: bool,
}

/// Structured metadata attached to a message, by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageMeta {
    Question(QuestionMeta),
    Answer(AnswerMeta),
}

/// One message in the interview history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub meta: Option<MessageMeta>,
}

impl TurnMessage {
    pub fn assistant(content: impl Into<String>, meta: QuestionMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            meta: Some(MessageMeta::Question(meta)),
        }
    }

    pub fn user(content: impl Into<String>, meta: AnswerMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
            meta: Some(MessageMeta::Answer(meta)),
        }
    }
}
