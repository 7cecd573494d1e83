//! Score repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::PrScoreResult;

/// Repository interface for scoring results. Results are insert-only.
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    async fn insert(&self, result: &PrScoreResult) -> DomainResult<()>;

    /// Most recent score recorded for an identifier.
    async fn latest_for(&self, identifier: &str) -> DomainResult<Option<PrScoreResult>>;
}
