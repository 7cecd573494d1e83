//! In-memory persistence adapter.
//!
//! Implements every repository port over process-local maps. Used by tests
//! and as the degraded backend when the SQLite store cannot be opened at
//! startup. `set_unavailable(true)` makes every call fail with a transient
//! database error, which lets callers exercise their outage handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    FileChangeEvent, IdempotencyRecord, IdempotencyStatus, PrScoreResult, Session, SessionChange,
    SessionStatus,
};
use crate::domain::ports::{IdempotencyRepository, ScoreRepository, SessionRepository};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    changes: RwLock<Vec<SessionChange>>,
    idempotency: RwLock<HashMap<String, IdempotencyRecord>>,
    scores: RwLock<Vec<PrScoreResult>>,
    next_change_id: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> DomainResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::DatabaseError("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    pub async fn score_count(&self) -> usize {
        self.scores.read().await.len()
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn upsert(&self, session: &Session) -> DomainResult<()> {
        self.check_available()?;
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Session>> {
        self.check_available()?;
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn list_by_status(&self, status: SessionStatus) -> DomainResult<Vec<Session>> {
        self.check_available()?;
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    async fn record_changes(&self, session_id: &str, events: &[FileChangeEvent]) -> DomainResult<()> {
        self.check_available()?;
        let mut changes = self.changes.write().await;
        for event in events {
            let id = self.next_change_id.fetch_add(1, Ordering::SeqCst) + 1;
            changes.push(SessionChange {
                id,
                session_id: session_id.to_string(),
                event: event.clone(),
                processed: false,
            });
        }
        Ok(())
    }

    async fn list_unprocessed_changes(&self, session_id: &str) -> DomainResult<Vec<SessionChange>> {
        self.check_available()?;
        Ok(self
            .changes
            .read()
            .await
            .iter()
            .filter(|c| c.session_id == session_id && !c.processed)
            .cloned()
            .collect())
    }

    async fn mark_changes_processed(&self, change_ids: &[i64]) -> DomainResult<()> {
        self.check_available()?;
        let mut changes = self.changes.write().await;
        for change in changes.iter_mut().filter(|c| change_ids.contains(&c.id)) {
            change.processed = true;
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryStore {
    async fn get(&self, key: &str) -> DomainResult<Option<IdempotencyRecord>> {
        self.check_available()?;
        Ok(self.idempotency.read().await.get(key).cloned())
    }

    async fn try_insert(&self, record: &IdempotencyRecord) -> DomainResult<bool> {
        self.check_available()?;
        let mut records = self.idempotency.write().await;
        if records.contains_key(&record.key) {
            return Ok(false);
        }
        records.insert(record.key.clone(), record.clone());
        Ok(true)
    }

    async fn try_reclaim(&self, record: &IdempotencyRecord, now: DateTime<Utc>) -> DomainResult<bool> {
        self.check_available()?;
        let mut records = self.idempotency.write().await;
        match records.get(&record.key) {
            Some(existing) if existing.is_claimable(now) => {
                records.insert(record.key.clone(), record.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        key: &str,
        claimed_at: DateTime<Utc>,
        status: IdempotencyStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        self.check_available()?;
        let mut records = self.idempotency.write().await;
        let Some(existing) = records
            .get_mut(key)
            .filter(|r| r.status == IdempotencyStatus::Processing && r.created_at == claimed_at)
        else {
            return Ok(false);
        };
        existing.status = status;
        existing.result = result.cloned();
        existing.error = error.map(str::to_string);
        existing.updated_at = now;
        Ok(true)
    }

    async fn upsert(&self, record: &IdempotencyRecord) -> DomainResult<()> {
        self.check_available()?;
        self.idempotency.write().await.insert(record.key.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl ScoreRepository for InMemoryStore {
    async fn insert(&self, result: &PrScoreResult) -> DomainResult<()> {
        self.check_available()?;
        self.scores.write().await.push(result.clone());
        Ok(())
    }

    async fn latest_for(&self, identifier: &str) -> DomainResult<Option<PrScoreResult>> {
        self.check_available()?;
        Ok(self
            .scores
            .read()
            .await
            .iter()
            .rev()
            .find(|s| s.identifier == identifier)
            .cloned())
    }
}
