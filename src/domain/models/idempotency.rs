//! Idempotency records.
//!
//! A record guards one side-effecting operation per `(operation, identifier)`.
//! It moves from `processing` to exactly one of `completed` or `failed`.
//! A `processing` record whose `expires_at` has passed is treated as
//! abandoned by a crashed owner and may be reclaimed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default lifetime of an idempotency record.
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Durable record for one guarded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation_type: String,
    pub status: IdempotencyStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// A fresh `processing` claim.
    pub fn processing(operation: &str, identifier: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: idempotency_key(operation, identifier),
            operation_type: operation.to_string(),
            status: IdempotencyStatus::Processing,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether a new caller may take this record over.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            IdempotencyStatus::Completed => false,
            IdempotencyStatus::Failed => true,
            IdempotencyStatus::Processing => self.is_expired(now),
        }
    }
}

/// Deterministic key for `(operation, identifier)`.
pub fn idempotency_key(operation: &str, identifier: &str) -> String {
    let digest = Sha256::digest(format!("{operation}:{identifier}").as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic_and_scoped() {
        let a = idempotency_key("create_proposal", "s1");
        assert_eq!(a, idempotency_key("create_proposal", "s1"));
        assert_ne!(a, idempotency_key("create_proposal", "s2"));
        assert_ne!(a, idempotency_key("score", "s1"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_claimable_states() {
        let now = Utc::now();
        let mut record = IdempotencyRecord::processing("op", "id", now, Duration::hours(24));
        assert!(!record.is_claimable(now));
        assert!(record.is_claimable(now + Duration::hours(25)));

        record.status = IdempotencyStatus::Failed;
        assert!(record.is_claimable(now));

        record.status = IdempotencyStatus::Completed;
        assert!(!record.is_claimable(now + Duration::hours(48)));
    }
}
