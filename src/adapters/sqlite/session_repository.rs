//! SQLite implementation of the SessionRepository.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime, parse_optional_json};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChangeType, FileChangeEvent, ProposalRef, Session, SessionChange, SessionStatus, Task,
};
use crate::domain::ports::SessionRepository;

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn upsert(&self, session: &Session) -> DomainResult<()> {
        let files = serde_json::to_string(&session.files)?;
        let tasks = serde_json::to_string(&session.tasks)?;
        let proposal = session.proposal.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO sessions (id, status, files, tasks, start_time, last_activity, time_window_bucket, proposal, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   status = excluded.status,
                   files = excluded.files,
                   tasks = excluded.tasks,
                   last_activity = excluded.last_activity,
                   proposal = excluded.proposal,
                   updated_at = excluded.updated_at"#
        )
        .bind(&session.id)
        .bind(session.status.as_str())
        .bind(files)
        .bind(tasks)
        .bind(format_datetime(session.start_time))
        .bind(format_datetime(session.last_activity))
        .bind(session.time_window_bucket)
        .bind(proposal)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_status(&self, status: SessionStatus) -> DomainResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE status = ? ORDER BY start_time"
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_changes(&self, session_id: &str, events: &[FileChangeEvent]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"INSERT INTO session_changes (session_id, path, change_type, timestamp, lines_added, lines_removed)
                   VALUES (?, ?, ?, ?, ?, ?)"#
            )
            .bind(session_id)
            .bind(&event.path)
            .bind(event.change_type.as_str())
            .bind(format_datetime(event.timestamp))
            .bind(i64::from(event.lines_added))
            .bind(i64::from(event.lines_removed))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_unprocessed_changes(&self, session_id: &str) -> DomainResult<Vec<SessionChange>> {
        let rows: Vec<ChangeRow> = sqlx::query_as(
            "SELECT * FROM session_changes WHERE session_id = ? AND processed = 0 ORDER BY id"
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_changes_processed(&self, change_ids: &[i64]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for id in change_ids {
            sqlx::query("UPDATE session_changes SET processed = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    status: String,
    files: String,
    tasks: String,
    start_time: String,
    last_activity: String,
    time_window_bucket: i64,
    proposal: Option<String>,
}

impl TryFrom<SessionRow> for Session {
    type Error = DomainError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = SessionStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid session status: {}", row.status)))?;
        let files: BTreeSet<String> = serde_json::from_str(&row.files)?;
        let tasks: Vec<Task> = serde_json::from_str(&row.tasks)?;
        let proposal: Option<ProposalRef> = parse_optional_json(row.proposal)?;

        Ok(Session {
            id: row.id,
            files,
            tasks,
            start_time: parse_datetime(&row.start_time)?,
            last_activity: parse_datetime(&row.last_activity)?,
            time_window_bucket: row.time_window_bucket,
            status,
            proposal,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChangeRow {
    id: i64,
    session_id: String,
    path: String,
    change_type: String,
    timestamp: String,
    lines_added: i64,
    lines_removed: i64,
    processed: bool,
}

impl TryFrom<ChangeRow> for SessionChange {
    type Error = DomainError;

    fn try_from(row: ChangeRow) -> Result<Self, Self::Error> {
        let change_type = ChangeType::from_str(&row.change_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid change type: {}", row.change_type)))?;
        let count = |n: i64| u32::try_from(n).map_err(|e| DomainError::SerializationError(e.to_string()));

        Ok(SessionChange {
            id: row.id,
            session_id: row.session_id,
            event: FileChangeEvent {
                path: row.path,
                change_type,
                timestamp: parse_datetime(&row.timestamp)?,
                lines_added: count(row.lines_added)?,
                lines_removed: count(row.lines_removed)?,
            },
            processed: row.processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::{Duration, TimeZone};

    async fn setup_test_repo() -> SqliteSessionRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteSessionRepository::new(pool)
    }

    fn sample_session() -> Session {
        let t0 = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let mut session = Session::start(
            "abc123",
            Task::new("edit_code", vec!["src/a.rs".into()], 0.9, t0).with_lines(12),
        );
        session.add_task(Task::new(
            "run_tests",
            vec!["src/a.rs".into(), "tests/a.rs".into()],
            1.0,
            t0 + Duration::seconds(90),
        ));
        session
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let repo = setup_test_repo().await;
        let session = sample_session();
        repo.upsert(&session).await.unwrap();

        let loaded = repo.get("abc123").await.unwrap().expect("session persisted");
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_status_and_proposal() {
        let repo = setup_test_repo().await;
        let mut session = sample_session();
        repo.upsert(&session).await.unwrap();

        session.complete();
        session.proposal = Some(ProposalRef::new("7", "https://example.test/pr/7"));
        repo.upsert(&session).await.unwrap();

        assert!(repo.list_by_status(SessionStatus::Active).await.unwrap().is_empty());
        let completed = repo.list_by_status(SessionStatus::Completed).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].proposal.as_ref().unwrap().id, "7");
    }

    #[tokio::test]
    async fn test_unprocessed_changes_lifecycle() {
        let repo = setup_test_repo().await;
        let session = sample_session();
        repo.upsert(&session).await.unwrap();

        let now = Utc::now();
        repo.record_changes(
            &session.id,
            &[
                FileChangeEvent::new("src/a.rs", ChangeType::Modified, now).with_lines(4, 1),
                FileChangeEvent::new("tests/a.rs", ChangeType::Added, now).with_lines(20, 0),
            ],
        )
        .await
        .unwrap();

        let pending = repo.list_unprocessed_changes(&session.id).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].event.path, "src/a.rs");
        assert_eq!(pending[1].event.lines_added, 20);

        repo.mark_changes_processed(&[pending[0].id]).await.unwrap();
        let pending = repo.list_unprocessed_changes(&session.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.path, "tests/a.rs");
    }
}
