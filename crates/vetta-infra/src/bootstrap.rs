//! Store and provider composition from configuration.
//!
//! The checkpoint store contract has two modes -- ephemeral in-process and
//! durable SQLite -- selected by `checkpoint_mode` in `config.toml` with
//! identical read/write semantics. The backend enums here let one
//! orchestrator type own either mode; construction happens once at startup
//! and the handles are passed down, never looked up globally.

use secrecy::SecretString;
use uuid::Uuid;

use vetta_core::checkpoint::CheckpointStore;
use vetta_core::repository::InterviewRepository;
use vetta_types::error::{CheckpointError, RepositoryError};
use vetta_types::llm::LlmError;
use vetta_types::message::TurnMessage;
use vetta_types::session::{SessionRecord, SessionState};

use crate::config::{AppConfig, CheckpointMode, database_url};
use crate::llm::OpenAiCompatProvider;
use crate::memory::{MemoryCheckpointStore, MemoryInterviewRepository};
use crate::sqlite::{DatabasePool, SqliteCheckpointStore, SqliteInterviewRepository};

/// Configuration-selected checkpoint store.
#[derive(Clone)]
pub enum CheckpointBackend {
    Memory(MemoryCheckpointStore),
    Sqlite(SqliteCheckpointStore),
}

impl CheckpointStore for CheckpointBackend {
    async fn get(&self, thread_id: &Uuid) -> Result<Option<SessionState>, CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.get(thread_id).await,
            CheckpointBackend::Sqlite(store) => store.get(thread_id).await,
        }
    }

    async fn put(&self, thread_id: &Uuid, state: &SessionState) -> Result<(), CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.put(thread_id, state).await,
            CheckpointBackend::Sqlite(store) => store.put(thread_id, state).await,
        }
    }

    async fn delete(&self, thread_id: &Uuid) -> Result<(), CheckpointError> {
        match self {
            CheckpointBackend::Memory(store) => store.delete(thread_id).await,
            CheckpointBackend::Sqlite(store) => store.delete(thread_id).await,
        }
    }
}

/// Configuration-selected interview repository.
#[derive(Clone)]
pub enum RepositoryBackend {
    Memory(MemoryInterviewRepository),
    Sqlite(SqliteInterviewRepository),
}

impl InterviewRepository for RepositoryBackend {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        match self {
            RepositoryBackend::Memory(repo) => repo.create_session(record).await,
            RepositoryBackend::Sqlite(repo) => repo.create_session(record).await,
        }
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        match self {
            RepositoryBackend::Memory(repo) => repo.update_session(record).await,
            RepositoryBackend::Sqlite(repo) => repo.update_session(record).await,
        }
    }

    async fn get_session(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        match self {
            RepositoryBackend::Memory(repo) => repo.get_session(session_id).await,
            RepositoryBackend::Sqlite(repo) => repo.get_session(session_id).await,
        }
    }

    async fn get_session_by_thread(
        &self,
        thread_id: &Uuid,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        match self {
            RepositoryBackend::Memory(repo) => repo.get_session_by_thread(thread_id).await,
            RepositoryBackend::Sqlite(repo) => repo.get_session_by_thread(thread_id).await,
        }
    }

    async fn append_message(
        &self,
        session_id: &Uuid,
        message: &TurnMessage,
    ) -> Result<(), RepositoryError> {
        match self {
            RepositoryBackend::Memory(repo) => repo.append_message(session_id, message).await,
            RepositoryBackend::Sqlite(repo) => repo.append_message(session_id, message).await,
        }
    }

    async fn get_messages(&self, session_id: &Uuid) -> Result<Vec<TurnMessage>, RepositoryError> {
        match self {
            RepositoryBackend::Memory(repo) => repo.get_messages(session_id).await,
            RepositoryBackend::Sqlite(repo) => repo.get_messages(session_id).await,
        }
    }
}

/// Store handles built once at startup.
pub struct Stores {
    pub checkpoints: CheckpointBackend,
    pub repository: RepositoryBackend,
}

/// Build the checkpoint store and repository for the configured mode.
///
/// Durable mode opens (and migrates) the SQLite database; ephemeral mode
/// touches nothing outside the process.
pub async fn build_stores(config: &AppConfig) -> Result<Stores, sqlx::Error> {
    match config.checkpoint_mode {
        CheckpointMode::Memory => {
            tracing::info!("using in-memory checkpoint store (state lost on restart)");
            Ok(Stores {
                checkpoints: CheckpointBackend::Memory(MemoryCheckpointStore::new()),
                repository: RepositoryBackend::Memory(MemoryInterviewRepository::new()),
            })
        }
        CheckpointMode::Sqlite => {
            let url = database_url(config);
            tracing::info!(url = %url, "using SQLite checkpoint store");
            let pool = DatabasePool::new(&url).await?;
            Ok(Stores {
                checkpoints: CheckpointBackend::Sqlite(SqliteCheckpointStore::new(pool.clone())),
                repository: RepositoryBackend::Sqlite(SqliteInterviewRepository::new(pool)),
            })
        }
    }
}

/// Build the LLM provider from configuration, reading the API key from the
/// configured environment variable.
pub fn build_provider(config: &AppConfig) -> Result<OpenAiCompatProvider, LlmError> {
    let api_key = std::env::var(&config.provider.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(
            env = %config.provider.api_key_env,
            "LLM API key environment variable is empty"
        );
    }
    OpenAiCompatProvider::new(config.provider.base_url.clone(), SecretString::from(api_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetta_types::session::{InterviewMode, SessionState};

    #[tokio::test]
    async fn test_memory_mode_builds_without_io() {
        let config = AppConfig::default();
        let stores = build_stores(&config).await.unwrap();
        assert!(matches!(stores.checkpoints, CheckpointBackend::Memory(_)));
        assert!(matches!(stores.repository, RepositoryBackend::Memory(_)));
    }

    #[tokio::test]
    async fn test_sqlite_mode_builds_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            checkpoint_mode: CheckpointMode::Sqlite,
            database_url: Some(format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("vetta.db").display()
            )),
            ..AppConfig::default()
        };
        let stores = build_stores(&config).await.unwrap();

        let mut state = SessionState::new("cand", InterviewMode::DynamicGap, 0.9, None);
        state.revision = 1;
        stores.checkpoints.put(&state.thread_id, &state).await.unwrap();
        let loaded = stores
            .checkpoints
            .get(&state.thread_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.session_id, state.session_id);
    }

    #[tokio::test]
    async fn test_both_backends_share_conflict_semantics() {
        // The same stale write is rejected identically in both modes.
        let memory = CheckpointBackend::Memory(MemoryCheckpointStore::new());

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("v.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let sqlite = CheckpointBackend::Sqlite(SqliteCheckpointStore::new(pool));

        for store in [memory, sqlite] {
            let mut state = SessionState::new("cand", InterviewMode::DynamicGap, 0.9, None);
            state.revision = 1;
            store.put(&state.thread_id, &state).await.unwrap();
            // Re-sending revision 1 conflicts in both backends.
            let result = store.put(&state.thread_id, &state).await;
            assert!(matches!(result, Err(CheckpointError::Conflict { .. })));
        }
    }
}
