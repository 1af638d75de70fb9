//! Typed events emitted by the streaming turn variants.
//!
//! Streaming is an observation channel over the same deterministic turn
//! computation as the blocking calls: the event sequence ends with a
//! `Complete` event carrying exactly the payload the synchronous call would
//! have returned.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::session::TerminationReason;

/// Pipeline stage markers for `NodeUpdate` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Interpret,
    Extract,
    Assess,
    Route,
    Generate,
    Finalize,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnStage::Interpret => write!(f, "interpret"),
            TurnStage::Extract => write!(f, "extract"),
            TurnStage::Assess => write!(f, "assess"),
            TurnStage::Route => write!(f, "route"),
            TurnStage::Generate => write!(f, "generate"),
            TurnStage::Finalize => write!(f, "finalize"),
        }
    }
}

/// Response payload of one orchestrator turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: Uuid,
    pub thread_id: Uuid,
    /// The next question, or None when the interview is over.
    pub question: Option<String>,
    pub completed: bool,
    pub termination_reason: Option<TerminationReason>,
    pub completeness_score: f64,
}

/// Ordered events yielded by the streaming turn variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A fragment of generated question text.
    Token { text: String },

    /// A pipeline stage finished.
    NodeUpdate { stage: TurnStage, detail: String },

    /// Component-specific progress (extraction counts, skip detection, ...).
    Custom {
        stage: String,
        detail: serde_json::Value,
    },

    /// The turn failed; no further events follow.
    Error { message: String },

    /// Terminal event carrying the same payload as the synchronous call.
    Complete { outcome: TurnOutcome },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_event_serde_tags() {
        let event = TurnEvent::NodeUpdate {
            stage: TurnStage::Extract,
            detail: "2 skills".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"node_update\""));
        assert!(json.contains("\"stage\":\"extract\""));
    }

    #[test]
    fn test_complete_event_roundtrip() {
        let event = TurnEvent::Complete {
            outcome: TurnOutcome {
                session_id: Uuid::now_v7(),
                thread_id: Uuid::now_v7(),
                question: None,
                completed: true,
                termination_reason: Some(TerminationReason::Complete),
                completeness_score: 0.92,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: TurnEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(TurnStage::Interpret.to_string(), "interpret");
        assert_eq!(TurnStage::Finalize.to_string(), "finalize");
    }
}
