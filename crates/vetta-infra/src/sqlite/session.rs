//! SQLite interview repository implementation.
//!
//! Persists session records and the append-only message log. Message
//! metadata is stored as a JSON column and round-trips through the typed
//! `MessageMeta` enum.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use vetta_core::repository::InterviewRepository;
use vetta_types::error::RepositoryError;
use vetta_types::message::{MessageMeta, MessageRole, TurnMessage};
use vetta_types::session::{InterviewMode, SessionRecord, SessionStatus, TerminationReason};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `InterviewRepository`.
#[derive(Clone)]
pub struct SqliteInterviewRepository {
    pool: DatabasePool,
}

impl SqliteInterviewRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    id: String,
    candidate_id: String,
    thread_id: String,
    mode: String,
    language: Option<String>,
    status: String,
    termination_reason: Option<String>,
    questions_asked: i64,
    questions_answered: i64,
    questions_skipped: i64,
    completeness_score: f64,
    created_at: String,
    completed_at: Option<String>,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            candidate_id: row.try_get("candidate_id")?,
            thread_id: row.try_get("thread_id")?,
            mode: row.try_get("mode")?,
            language: row.try_get("language")?,
            status: row.try_get("status")?,
            termination_reason: row.try_get("termination_reason")?,
            questions_asked: row.try_get("questions_asked")?,
            questions_answered: row.try_get("questions_answered")?,
            questions_skipped: row.try_get("questions_skipped")?,
            completeness_score: row.try_get("completeness_score")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, RepositoryError> {
        Ok(SessionRecord {
            id: parse_uuid(&self.id)?,
            candidate_id: self.candidate_id,
            thread_id: parse_uuid(&self.thread_id)?,
            mode: self
                .mode
                .parse::<InterviewMode>()
                .map_err(RepositoryError::Query)?,
            language: self.language,
            status: self
                .status
                .parse::<SessionStatus>()
                .map_err(RepositoryError::Query)?,
            termination_reason: self
                .termination_reason
                .map(|r| r.parse::<TerminationReason>())
                .transpose()
                .map_err(RepositoryError::Query)?,
            questions_asked: self.questions_asked as u32,
            questions_answered: self.questions_answered as u32,
            questions_skipped: self.questions_skipped as u32,
            completeness_score: self.completeness_score,
            created_at: parse_datetime(&self.created_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid uuid: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

// ---------------------------------------------------------------------------
// InterviewRepository implementation
// ---------------------------------------------------------------------------

impl InterviewRepository for SqliteInterviewRepository {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO interview_sessions
               (id, candidate_id, thread_id, mode, language, status, termination_reason,
                questions_asked, questions_answered, questions_skipped, completeness_score,
                created_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.candidate_id)
        .bind(record.thread_id.to_string())
        .bind(record.mode.to_string())
        .bind(&record.language)
        .bind(record.status.to_string())
        .bind(record.termination_reason.map(|r| r.to_string()))
        .bind(record.questions_asked as i64)
        .bind(record.questions_answered as i64)
        .bind(record.questions_skipped as i64)
        .bind(record.completeness_score)
        .bind(record.created_at.to_rfc3339())
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("session {} already exists", record.id))
            }
            _ => RepositoryError::Query(e.to_string()),
        })?;

        Ok(())
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"UPDATE interview_sessions SET
               status = ?, termination_reason = ?, questions_asked = ?,
               questions_answered = ?, questions_skipped = ?, completeness_score = ?,
               completed_at = ?
               WHERE id = ?"#,
        )
        .bind(record.status.to_string())
        .bind(record.termination_reason.map(|r| r.to_string()))
        .bind(record.questions_asked as i64)
        .bind(record.questions_answered as i64)
        .bind(record.questions_skipped as i64)
        .bind(record.completeness_score)
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .bind(record.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM interview_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn get_session_by_thread(
        &self,
        thread_id: &Uuid,
    ) -> Result<Option<SessionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM interview_sessions WHERE thread_id = ?")
            .bind(thread_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn append_message(
        &self,
        session_id: &Uuid,
        message: &TurnMessage,
    ) -> Result<(), RepositoryError> {
        let meta_json = message
            .meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("failed to serialize meta: {e}")))?;

        sqlx::query(
            r#"INSERT INTO interview_messages (id, session_id, role, content, meta, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(session_id.to_string())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(meta_json)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_messages(&self, session_id: &Uuid) -> Result<Vec<TurnMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, role, content, meta, created_at FROM interview_messages
             WHERE session_id = ? ORDER BY created_at, id",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let role: String = row
                .try_get("role")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let content: String = row
                .try_get("content")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let meta: Option<String> = row
                .try_get("meta")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            messages.push(TurnMessage {
                id: parse_uuid(&id)?,
                role: role
                    .parse::<MessageRole>()
                    .map_err(RepositoryError::Query)?,
                content,
                created_at: parse_datetime(&created_at)?,
                meta: meta
                    .as_deref()
                    .map(serde_json::from_str::<MessageMeta>)
                    .transpose()
                    .map_err(|e| RepositoryError::Query(format!("invalid meta JSON: {e}")))?,
            });
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetta_types::message::{
        AnswerMeta, AnswerType, EngagementLevel, QuestionMeta, QuestionType,
    };
    use vetta_types::session::SessionState;
    use vetta_types::skill::SkillAttribute;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn record() -> SessionRecord {
        let state = SessionState::new("cand-9", InterviewMode::DynamicGap, 0.9, Some("en".into()));
        SessionRecord::from_state(&state)
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let repo = SqliteInterviewRepository::new(test_pool().await);
        let record = record();
        repo.create_session(&record).await.unwrap();

        let loaded = repo.get_session(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.candidate_id, "cand-9");
        assert_eq!(loaded.mode, InterviewMode::DynamicGap);
        assert_eq!(loaded.status, SessionStatus::Active);

        let by_thread = repo
            .get_session_by_thread(&record.thread_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_thread.id, record.id);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let repo = SqliteInterviewRepository::new(test_pool().await);
        let record = record();
        repo.create_session(&record).await.unwrap();
        assert!(matches!(
            repo.create_session(&record).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_session_metrics() {
        let repo = SqliteInterviewRepository::new(test_pool().await);
        let mut record = record();
        repo.create_session(&record).await.unwrap();

        record.status = SessionStatus::Completed;
        record.termination_reason = Some(TerminationReason::Complete);
        record.questions_asked = 7;
        record.completeness_score = 0.92;
        record.completed_at = Some(Utc::now());
        repo.update_session(&record).await.unwrap();

        let loaded = repo.get_session(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.termination_reason, Some(TerminationReason::Complete));
        assert_eq!(loaded.questions_asked, 7);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_message_log_roundtrip_with_metadata() {
        let repo = SqliteInterviewRepository::new(test_pool().await);
        let record = record();
        repo.create_session(&record).await.unwrap();

        let question = TurnMessage::assistant(
            "How long have you used Python?",
            QuestionMeta {
                question_type: QuestionType::FirstQuestion,
                gap_id: Some(Uuid::now_v7()),
                targets_attributes: vec![SkillAttribute::Duration],
                sequence: 1,
            },
        );
        let answer = TurnMessage::user(
            "3 years",
            AnswerMeta {
                answer_type: AnswerType::DirectAnswer,
                engagement_level: EngagementLevel::Engaged,
                detail_score: 3,
                relevance_score: 1.0,
                enthusiasm: false,
                gap_id: None,
                skills_extracted: vec!["Python".to_string()],
                gap_resolved: true,
            },
        );
        repo.append_message(&record.id, &question).await.unwrap();
        repo.append_message(&record.id, &answer).await.unwrap();

        let messages = repo.get_messages(&record.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], question);
        assert_eq!(messages[1], answer);
    }

    #[tokio::test]
    async fn test_messages_require_existing_session() {
        let repo = SqliteInterviewRepository::new(test_pool().await);
        let orphan = TurnMessage::user(
            "hello",
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
        // Foreign keys are enforced: no parent session, no insert.
        assert!(repo.append_message(&Uuid::now_v7(), &orphan).await.is_err());
    }
}
