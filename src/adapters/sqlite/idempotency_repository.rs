//! SQLite implementation of the IdempotencyRepository.
//!
//! Both claim paths are single conditional statements, so racing callers
//! (in this process or another one sharing the database file) are
//! serialized by SQLite and exactly one of them sees a changed row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime, parse_optional_json};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{IdempotencyRecord, IdempotencyStatus};
use crate::domain::ports::IdempotencyRepository;

pub struct SqliteIdempotencyRepository {
    pool: SqlitePool,
}

impl SqliteIdempotencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for SqliteIdempotencyRepository {
    async fn get(&self, key: &str) -> DomainResult<Option<IdempotencyRecord>> {
        let row: Option<IdempotencyRow> = sqlx::query_as("SELECT * FROM idempotency_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn try_insert(&self, record: &IdempotencyRecord) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO idempotency_keys (key, operation_type, status, result, error, created_at, updated_at, expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(key) DO NOTHING"#
        )
        .bind(&record.key)
        .bind(&record.operation_type)
        .bind(record.status.as_str())
        .bind(record.result.as_ref().map(serde_json::Value::to_string))
        .bind(&record.error)
        .bind(format_datetime(record.created_at))
        .bind(format_datetime(record.updated_at))
        .bind(format_datetime(record.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_reclaim(&self, record: &IdempotencyRecord, now: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE idempotency_keys
               SET operation_type = ?, status = ?, result = NULL, error = NULL,
                   created_at = ?, updated_at = ?, expires_at = ?
               WHERE key = ?
                 AND (status = 'failed' OR (status = 'processing' AND expires_at <= ?))"#
        )
        .bind(&record.operation_type)
        .bind(record.status.as_str())
        .bind(format_datetime(record.created_at))
        .bind(format_datetime(record.updated_at))
        .bind(format_datetime(record.expires_at))
        .bind(&record.key)
        .bind(format_datetime(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
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
        let outcome = sqlx::query(
            r#"UPDATE idempotency_keys
               SET status = ?, result = ?, error = ?, updated_at = ?
               WHERE key = ? AND status = 'processing' AND created_at = ?"#
        )
        .bind(status.as_str())
        .bind(result.map(serde_json::Value::to_string))
        .bind(error)
        .bind(format_datetime(now))
        .bind(key)
        .bind(format_datetime(claimed_at))
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn upsert(&self, record: &IdempotencyRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO idempotency_keys (key, operation_type, status, result, error, created_at, updated_at, expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                   operation_type = excluded.operation_type,
                   status = excluded.status,
                   result = excluded.result,
                   error = excluded.error,
                   updated_at = excluded.updated_at,
                   expires_at = excluded.expires_at"#
        )
        .bind(&record.key)
        .bind(&record.operation_type)
        .bind(record.status.as_str())
        .bind(record.result.as_ref().map(serde_json::Value::to_string))
        .bind(&record.error)
        .bind(format_datetime(record.created_at))
        .bind(format_datetime(record.updated_at))
        .bind(format_datetime(record.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    key: String,
    operation_type: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
    expires_at: String,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = DomainError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        let status = IdempotencyStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid idempotency status: {}", row.status)))?;

        Ok(IdempotencyRecord {
            key: row.key,
            operation_type: row.operation_type,
            status,
            result: parse_optional_json(row.result)?,
            error: row.error,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            expires_at: parse_datetime(&row.expires_at)?,
        })
    }
}
