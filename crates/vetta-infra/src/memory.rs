//! In-memory checkpoint store and repository (ephemeral mode).
//!
//! Zero external dependencies: state lives in process memory and is lost on
//! restart. Read/write semantics -- including revision conflict detection --
//! match the SQLite implementations exactly, so the two modes are
//! interchangeable behind configuration.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use vetta_core::checkpoint::CheckpointStore;
use vetta_core::repository::InterviewRepository;
use vetta_types::error::{CheckpointError, RepositoryError};
use vetta_types::message::TurnMessage;
use vetta_types::session::{SessionRecord, SessionState};

/// In-process checkpoint store backed by a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<DashMap<Uuid, SessionState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, thread_id: &Uuid) -> Result<Option<SessionState>, CheckpointError> {
        Ok(self.inner.get(thread_id).map(|entry| entry.clone()))
    }

    async fn put(&self, thread_id: &Uuid, state: &SessionState) -> Result<(), CheckpointError> {
        match self.inner.entry(*thread_id) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let stored = occupied.get().revision;
                if state.revision != stored + 1 {
                    return Err(CheckpointError::Conflict {
                        thread_id: *thread_id,
                        expected: stored + 1,
                        found: state.revision,
                    });
                }
                occupied.insert(state.clone());
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(state.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, thread_id: &Uuid) -> Result<(), CheckpointError> {
        self.inner.remove(thread_id);
        Ok(())
    }
}

/// In-process interview repository: session records plus per-session
/// message logs.
#[derive(Clone, Default)]
pub struct MemoryInterviewRepository {
    sessions: Arc<DashMap<Uuid, SessionRecord>>,
    messages: Arc<DashMap<Uuid, Vec<TurnMessage>>>,
}

impl MemoryInterviewRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InterviewRepository for MemoryInterviewRepository {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        if self.sessions.contains_key(&record.id) {
            return Err(RepositoryError::Conflict(format!(
                "session {} already exists",
                record.id
            )));
        }
        self.sessions.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        self.sessions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self.sessions.get(session_id).map(|entry| entry.clone()))
    }

    async fn get_session_by_thread(
        &self,
        thread_id: &Uuid,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self
            .sessions
            .iter()
            .find(|entry| entry.thread_id == *thread_id)
            .map(|entry| entry.clone()))
    }

    async fn append_message(
        &self,
        session_id: &Uuid,
        message: &TurnMessage,
    ) -> Result<(), RepositoryError> {
        self.messages
            .entry(*session_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_messages(&self, session_id: &Uuid) -> Result<Vec<TurnMessage>, RepositoryError> {
        Ok(self
            .messages
            .get(session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetta_types::message::{AnswerMeta, AnswerType, EngagementLevel};
    use vetta_types::session::InterviewMode;

    fn state() -> SessionState {
        SessionState::new("cand", InterviewMode::DynamicGap, 0.9, None)
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryCheckpointStore::new();
        let mut state = state();
        state.revision = 1;
        store.put(&state.thread_id, &state).await.unwrap();

        let loaded = store.get(&state.thread_id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_put_detects_revision_conflict() {
        let store = MemoryCheckpointStore::new();
        let mut state = state();
        state.revision = 1;
        store.put(&state.thread_id, &state).await.unwrap();

        // Same revision again: a second writer raced us.
        let result = store.put(&state.thread_id, &state).await;
        assert!(matches!(result, Err(CheckpointError::Conflict { .. })));

        // The next revision commits.
        state.revision = 2;
        store.put(&state.thread_id, &state).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryCheckpointStore::new();
        let thread_id = Uuid::now_v7();
        store.delete(&thread_id).await.unwrap();

        let mut state = state();
        state.revision = 1;
        store.put(&state.thread_id, &state).await.unwrap();
        store.delete(&state.thread_id).await.unwrap();
        assert!(store.get(&state.thread_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repository_roundtrip() {
        let repo = MemoryInterviewRepository::new();
        let state = state();
        let record = SessionRecord::from_state(&state);
        repo.create_session(&record).await.unwrap();

        let loaded = repo.get_session(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        let by_thread = repo
            .get_session_by_thread(&record.thread_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_thread.id, record.id);

        // Duplicate create conflicts; update does not.
        assert!(matches!(
            repo.create_session(&record).await,
            Err(RepositoryError::Conflict(_))
        ));
        repo.update_session(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_message_log_appends_in_order() {
        let repo = MemoryInterviewRepository::new();
        let session_id = Uuid::now_v7();
        for i in 0..3 {
            let message = TurnMessage::user(
                format!("answer {i}"),
                AnswerMeta {
                    answer_type: AnswerType::DirectAnswer,
                    engagement_level: EngagementLevel::Engaged,
                    detail_score: 3,
                    relevance_score: 1.0,
                    enthusiasm: false,
                    gap_id: None,
                    skills_extracted: vec![],
                    gap_resolved: false,
                },
            );
            repo.append_message(&session_id, &message).await.unwrap();
        }
        let messages = repo.get_messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "answer 0");
        assert_eq!(messages[2].content, "answer 2");
    }
}
