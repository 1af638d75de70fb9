use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;

/// Errors from checkpoint store operations.
///
/// Checkpoint writes are atomic per turn: a failed `put` leaves the prior
/// snapshot intact, so the caller may retry the whole turn with the same
/// input.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint for thread {0}")]
    NotFound(Uuid),

    #[error("checkpoint conflict for thread {thread_id}: expected revision {expected}, found {found}")]
    Conflict {
        thread_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("checkpoint storage error: {0}")]
    Storage(String),

    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
}

/// Errors from repository operations (session records and message logs).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Top-level error taxonomy for a single interview turn.
///
/// Classification and extraction failures are recovered locally inside the
/// components (the turn never blocks on them), so they do not appear here.
/// What does appear is everything a caller can observe: missing sessions,
/// exhausted model retries, and failed checkpoint commits.
#[derive(Debug, Error)]
pub enum InterviewError {
    #[error("interview session not found for thread {0}")]
    SessionNotFound(Uuid),

    #[error("interview session {0} is no longer active")]
    SessionTerminated(Uuid),

    #[error("predefined_questions mode requires a question set")]
    MissingQuestionSet,

    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("language model call failed after retries: {0}")]
    Upstream(#[from] LlmError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_error_display() {
        let err = CheckpointError::Conflict {
            thread_id: Uuid::nil(),
            expected: 3,
            found: 5,
        };
        assert!(err.to_string().contains("expected revision 3"));
        assert!(err.to_string().contains("found 5"));
    }

    #[test]
    fn test_interview_error_from_checkpoint() {
        let err: InterviewError = CheckpointError::Storage("disk full".to_string()).into();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_session_not_found_display() {
        let id = Uuid::nil();
        let err = InterviewError::SessionNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
