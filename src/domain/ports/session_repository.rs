//! Session repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FileChangeEvent, Session, SessionChange, SessionStatus};

/// Repository interface for Session persistence.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace the full state of a session.
    async fn upsert(&self, session: &Session) -> DomainResult<()>;

    /// Get a session by ID.
    async fn get(&self, id: &str) -> DomainResult<Option<Session>>;

    /// List sessions by status.
    async fn list_by_status(&self, status: SessionStatus) -> DomainResult<Vec<Session>>;

    /// Attribute raw change events to a session.
    async fn record_changes(&self, session_id: &str, events: &[FileChangeEvent]) -> DomainResult<()>;

    /// Changes not yet consumed by a proposal, in arrival order.
    async fn list_unprocessed_changes(&self, session_id: &str) -> DomainResult<Vec<SessionChange>>;

    /// Mark the given change records as consumed.
    async fn mark_changes_processed(&self, change_ids: &[i64]) -> DomainResult<()>;
}
