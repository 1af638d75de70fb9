//! Interview repository trait: the audit-facing persistence layout.
//!
//! One record per session (metrics, status, mode, thread reference) plus an
//! append-only message log with per-message structured metadata. Together
//! with the checkpoint store this is the canonical source of truth for
//! audit and resumption. Implementations live in vetta-infra.

use uuid::Uuid;

use vetta_types::error::RepositoryError;
use vetta_types::message::TurnMessage;
use vetta_types::session::SessionRecord;

/// Repository trait for session records and message logs.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait InterviewRepository: Send + Sync {
    /// Create a new session record.
    fn create_session(
        &self,
        record: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update an existing session record (metrics, status, reason).
    fn update_session(
        &self,
        record: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a session record by session id.
    fn get_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<SessionRecord>, RepositoryError>> + Send;

    /// Get a session record by thread id.
    fn get_session_by_thread(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<SessionRecord>, RepositoryError>> + Send;

    /// Append a message to a session's log.
    fn append_message(
        &self,
        session_id: &Uuid,
        message: &TurnMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a session's messages, oldest first.
    fn get_messages(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<TurnMessage>, RepositoryError>> + Send;
}
