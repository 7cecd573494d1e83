//! SQLite implementation of the ScoreRepository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Decision, PrScoreResult, ViolationResult};
use crate::domain::ports::ScoreRepository;

pub struct SqliteScoreRepository {
    pool: SqlitePool,
}

impl SqliteScoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreRepository for SqliteScoreRepository {
    async fn insert(&self, result: &PrScoreResult) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO pr_scores (identifier, category_scores, violations, pipeline_complete, pipeline_bonus,
                                      weighted_sum, stabilized_score, approve_threshold, decision, scored_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(&result.identifier)
        .bind(serde_json::to_string(&result.category_scores)?)
        .bind(serde_json::to_string(&result.violations)?)
        .bind(result.pipeline_complete)
        .bind(result.pipeline_bonus)
        .bind(result.weighted_sum)
        .bind(result.stabilized_score)
        .bind(result.approve_threshold)
        .bind(result.decision.as_str())
        .bind(format_datetime(result.scored_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_for(&self, identifier: &str) -> DomainResult<Option<PrScoreResult>> {
        let row: Option<ScoreRow> = sqlx::query_as(
            "SELECT * FROM pr_scores WHERE identifier = ? ORDER BY scored_at DESC, id DESC LIMIT 1"
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    identifier: String,
    category_scores: String,
    violations: String,
    pipeline_complete: bool,
    pipeline_bonus: f64,
    weighted_sum: f64,
    stabilized_score: f64,
    approve_threshold: f64,
    decision: String,
    scored_at: String,
}

impl TryFrom<ScoreRow> for PrScoreResult {
    type Error = DomainError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        let decision = Decision::from_str(&row.decision)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid decision: {}", row.decision)))?;
        let category_scores: BTreeMap<String, f64> = serde_json::from_str(&row.category_scores)?;
        let violations: Vec<ViolationResult> = serde_json::from_str(&row.violations)?;

        Ok(PrScoreResult {
            identifier: row.identifier,
            category_scores,
            violations,
            pipeline_complete: row.pipeline_complete,
            pipeline_bonus: row.pipeline_bonus,
            weighted_sum: row.weighted_sum,
            stabilized_score: row.stabilized_score,
            approve_threshold: row.approve_threshold,
            decision,
            scored_at: parse_datetime(&row.scored_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{Finding, Severity};
    use chrono::{Duration, Utc};

    fn sample(identifier: &str, decision: Decision, offset_secs: i64) -> PrScoreResult {
        PrScoreResult {
            identifier: identifier.to_string(),
            category_scores: BTreeMap::from([("change_size".to_string(), 1.5)]),
            violations: vec![ViolationResult::from_finding(
                "secrets",
                "src/config.rs",
                Finding::new("SEC-001", Severity::Warning, "token literal", 1.0).at_line(3),
            )],
            pipeline_complete: true,
            pipeline_bonus: 2.0,
            weighted_sum: 2.5,
            stabilized_score: 6.5,
            approve_threshold: 7.0,
            decision,
            scored_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_insert_and_latest() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteScoreRepository::new(pool);

        repo.insert(&sample("pr-1", Decision::ReviewRequired, 0)).await.unwrap();
        repo.insert(&sample("pr-1", Decision::AutoBlock, 10)).await.unwrap();
        repo.insert(&sample("pr-2", Decision::AutoApprove, 20)).await.unwrap();

        let latest = repo.latest_for("pr-1").await.unwrap().unwrap();
        assert_eq!(latest.decision, Decision::AutoBlock);
        assert_eq!(latest.violations.len(), 1);
        assert_eq!(latest.violations[0].line, Some(3));
        assert!(repo.latest_for("missing").await.unwrap().is_none());
    }
}
