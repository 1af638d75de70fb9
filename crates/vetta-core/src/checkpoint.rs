//! Checkpoint store trait.
//!
//! Durable key-value persistence of session state keyed by thread id.
//! Implementations live in vetta-infra: an ephemeral in-process store
//! (state lost on restart, zero external dependencies) and a durable SQLite
//! store, selected by configuration with identical read/write semantics.
//!
//! `put` is atomic per turn: either the full updated snapshot is durably
//! written or the prior snapshot remains visible on the next `get`. The
//! session's `revision` counter detects conflicting writers -- with the
//! orchestrator's per-thread serialization a conflict indicates a second
//! orchestrator over the same store.

use uuid::Uuid;

use vetta_types::error::CheckpointError;
use vetta_types::session::SessionState;

/// Trait for session-state checkpoint persistence.
///
/// Uses RPITIT (native async fn in traits). Implementations must be cheap
/// to clone or shared behind the caller's handle.
pub trait CheckpointStore: Send + Sync {
    /// Load the latest snapshot for a thread. `None` if the thread has
    /// never been checkpointed.
    fn get(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<SessionState>, CheckpointError>> + Send;

    /// Atomically persist a snapshot.
    ///
    /// The snapshot's `revision` must be exactly one greater than the
    /// stored revision (or the thread must be absent for revision 1 / an
    /// initial write); otherwise the store returns
    /// [`CheckpointError::Conflict`] and keeps the prior snapshot.
    fn put(
        &self,
        thread_id: &Uuid,
        state: &SessionState,
    ) -> impl std::future::Future<Output = Result<(), CheckpointError>> + Send;

    /// Drop a thread's snapshot. No-op if absent.
    fn delete(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), CheckpointError>> + Send;
}
