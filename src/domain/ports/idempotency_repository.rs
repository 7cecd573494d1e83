//! Idempotency record repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{IdempotencyRecord, IdempotencyStatus};

/// Repository interface for idempotency records.
///
/// `try_insert` and `try_reclaim` must be atomic conditional writes: when
/// two callers race, exactly one of them observes `true`.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Get a record by key.
    async fn get(&self, key: &str) -> DomainResult<Option<IdempotencyRecord>>;

    /// Insert the record only if no record exists for its key.
    async fn try_insert(&self, record: &IdempotencyRecord) -> DomainResult<bool>;

    /// Replace the record for its key only if the stored one is `failed`, or
    /// `processing` with `expires_at <= now`.
    async fn try_reclaim(&self, record: &IdempotencyRecord, now: DateTime<Utc>) -> DomainResult<bool>;

    /// Finish a `processing` record, but only the claim whose `created_at`
    /// equals `claimed_at`. Returns `false` when the record is missing,
    /// already finished, or was reclaimed by someone else.
    async fn update_status(
        &self,
        key: &str,
        claimed_at: DateTime<Utc>,
        status: IdempotencyStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Insert or overwrite unconditionally.
    async fn upsert(&self, record: &IdempotencyRecord) -> DomainResult<()>;
}
