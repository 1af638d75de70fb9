//! SQLite checkpoint store implementation.
//!
//! One row per thread holding the full serialized session state. `put`
//! replaces the row atomically in a single upsert guarded by the revision
//! counter: either the whole new snapshot lands or the prior one stays
//! visible. A revision mismatch (a second writer over the same store)
//! surfaces as a conflict without touching the stored row.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use vetta_core::checkpoint::CheckpointStore;
use vetta_types::error::CheckpointError;
use vetta_types::session::SessionState;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointStore`.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, thread_id: &Uuid) -> Result<Option<SessionState>, CheckpointError> {
        let row = sqlx::query("SELECT state FROM interview_checkpoints WHERE thread_id = ?")
            .bind(thread_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let state_json: String = row
                    .try_get("state")
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let state: SessionState = serde_json::from_str(&state_json)
                    .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, thread_id: &Uuid, state: &SessionState) -> Result<(), CheckpointError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        // Single guarded upsert: the update only applies when the snapshot
        // is exactly one revision ahead of the stored row.
        let result = sqlx::query(
            r#"INSERT INTO interview_checkpoints (thread_id, revision, state, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (thread_id) DO UPDATE SET
                   revision = excluded.revision,
                   state = excluded.state,
                   updated_at = excluded.updated_at
               WHERE interview_checkpoints.revision = excluded.revision - 1"#,
        )
        .bind(thread_id.to_string())
        .bind(state.revision as i64)
        .bind(&state_json)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            let found: Option<(i64,)> =
                sqlx::query_as("SELECT revision FROM interview_checkpoints WHERE thread_id = ?")
                    .bind(thread_id.to_string())
                    .fetch_optional(&self.pool.reader)
                    .await
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let stored = found.map(|(r,)| r as u64).unwrap_or(0);
            return Err(CheckpointError::Conflict {
                thread_id: *thread_id,
                expected: stored + 1,
                found: state.revision,
            });
        }

        tracing::debug!(
            thread_id = %thread_id,
            revision = state.revision,
            "checkpointed session state"
        );
        Ok(())
    }

    async fn delete(&self, thread_id: &Uuid) -> Result<(), CheckpointError> {
        sqlx::query("DELETE FROM interview_checkpoints WHERE thread_id = ?")
            .bind(thread_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(())
    }
}
