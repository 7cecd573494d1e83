//! At-most-once execution per (operation, identifier).
//!
//! The guard is the only correctness boundary between racing triggers
//! (buffer flush, manual command, retries in another process). A caller
//! may perform the guarded side effect only after `acquire` returns
//! [`AcquireOutcome::Acquired`], and must finish its [`Claim`] with exactly
//! one of `complete` or `fail`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{idempotency_key, IdempotencyRecord, IdempotencyStatus, DEFAULT_TTL_HOURS};
use crate::domain::ports::IdempotencyRepository;

/// Conditional insert/claim attempts before conceding to a concurrent owner.
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Proof of ownership of one `processing` record.
///
/// The claim time is stored as the record's `created_at`; a reclaim by
/// another caller replaces it, after which this claim can no longer finish
/// the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    operation: String,
    identifier: String,
    claimed_at: DateTime<Utc>,
}

impl Claim {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn claimed_at(&self) -> DateTime<Utc> {
        self.claimed_at
    }
}

/// Result of [`IdempotencyGuard::acquire`].
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// The caller owns the operation and must run it.
    Acquired(Claim),
    /// The operation already ran; carries the stored result for replay.
    Completed(Option<Value>),
    /// Another execution holds an unexpired `processing` record.
    InFlight,
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }

    /// `(cached_result, acquired)`.
    pub fn into_parts(self) -> (Option<Value>, bool) {
        match self {
            Self::Acquired(_) => (None, true),
            Self::Completed(result) => (result, false),
            Self::InFlight => (None, false),
        }
    }
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    repo: Arc<dyn IdempotencyRepository>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(repo: Arc<dyn IdempotencyRepository>, ttl_hours: i64) -> Self {
        let ttl_hours = if ttl_hours > 0 { ttl_hours } else { DEFAULT_TTL_HOURS };
        Self {
            repo,
            ttl: Duration::hours(ttl_hours),
        }
    }

    #[instrument(skip(self))]
    pub async fn acquire(&self, operation: &str, identifier: &str) -> AcquireOutcome {
        let claim = Claim {
            operation: operation.to_string(),
            identifier: identifier.to_string(),
            claimed_at: Utc::now(),
        };
        match self.try_acquire(&claim).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Fail open. While the store is unreachable we prefer making
                // progress over strict exactly-once: a concurrent trigger in
                // the same outage window can duplicate the side effect.
                warn!(
                    operation,
                    identifier,
                    error = %e,
                    "idempotency store unavailable; proceeding without a guard record"
                );
                AcquireOutcome::Acquired(claim)
            }
        }
    }

    async fn try_acquire(&self, claim: &Claim) -> DomainResult<AcquireOutcome> {
        let (operation, identifier, now) = (claim.operation.as_str(), claim.identifier.as_str(), claim.claimed_at);
        let record = IdempotencyRecord::processing(operation, identifier, now, self.ttl);

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            match self.repo.get(&record.key).await? {
                None => {
                    if self.repo.try_insert(&record).await? {
                        debug!(operation, identifier, "idempotency record created");
                        return Ok(AcquireOutcome::Acquired(claim.clone()));
                    }
                }
                Some(existing) if existing.status == IdempotencyStatus::Completed => {
                    return Ok(AcquireOutcome::Completed(existing.result));
                }
                Some(existing) if existing.is_claimable(now) => {
                    if self.repo.try_reclaim(&record, now).await? {
                        debug!(
                            operation,
                            identifier,
                            previous = existing.status.as_str(),
                            "idempotency record reclaimed"
                        );
                        return Ok(AcquireOutcome::Acquired(claim.clone()));
                    }
                }
                Some(_) => return Ok(AcquireOutcome::InFlight),
            }
            debug!(operation, identifier, attempt, "lost idempotency claim race; re-reading");
        }

        Ok(AcquireOutcome::InFlight)
    }

    /// Record success and store `result` for future replay.
    #[instrument(skip(self, claim, result), fields(operation = %claim.operation, identifier = %claim.identifier))]
    pub async fn complete(&self, claim: &Claim, result: &Value) -> DomainResult<()> {
        self.finish(claim, IdempotencyStatus::Completed, Some(result), None).await
    }

    /// Record failure; the key becomes claimable again.
    #[instrument(skip(self, claim), fields(operation = %claim.operation, identifier = %claim.identifier))]
    pub async fn fail(&self, claim: &Claim, error: &str) -> DomainResult<()> {
        self.finish(claim, IdempotencyStatus::Failed, None, Some(error)).await
    }

    /// Move the claimed record out of `processing`, exactly once.
    ///
    /// Returns `ConcurrencyConflict` when the record no longer belongs to
    /// this claim (reclaimed after expiry, or already finished).
    async fn finish(
        &self,
        claim: &Claim,
        status: IdempotencyStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> DomainResult<()> {
        let now = Utc::now();
        let key = idempotency_key(&claim.operation, &claim.identifier);
        if self
            .repo
            .update_status(&key, claim.claimed_at, status, result, error, now)
            .await?
        {
            return Ok(());
        }

        // The claim may have been taken fail-open, with no record behind it.
        // Write the final record only if nobody else has one.
        let mut record = IdempotencyRecord::processing(&claim.operation, &claim.identifier, claim.claimed_at, self.ttl);
        record.status = status;
        record.result = result.cloned();
        record.error = error.map(str::to_string);
        record.updated_at = now;
        if self.repo.try_insert(&record).await? {
            return Ok(());
        }

        warn!(
            operation = %claim.operation,
            identifier = %claim.identifier,
            status = status.as_str(),
            "idempotency record is no longer held by this claim; leaving it untouched"
        );
        Err(DomainError::ConcurrencyConflict {
            operation: claim.operation.clone(),
            identifier: claim.identifier.clone(),
        })
    }
}
