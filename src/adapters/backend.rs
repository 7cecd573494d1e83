//! Persistence backend selection.
//!
//! The backend is chosen once, at startup. Callers hold the resulting
//! trait objects for the life of the process and never re-probe.

use std::sync::Arc;

use crate::adapters::memory::InMemoryStore;
use crate::adapters::sqlite::{
    database_url, initialize_database, PoolConfig, SqliteIdempotencyRepository,
    SqliteScoreRepository, SqliteSessionRepository,
};
use crate::domain::models::DatabaseConfig;
use crate::domain::ports::{IdempotencyRepository, ScoreRepository, SessionRepository};

/// Which adapter ended up backing the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    InMemory,
}

/// The repositories the pipeline persists through.
#[derive(Clone)]
pub struct PersistenceBackend {
    pub kind: BackendKind,
    pub sessions: Arc<dyn SessionRepository>,
    pub idempotency: Arc<dyn IdempotencyRepository>,
    pub scores: Arc<dyn ScoreRepository>,
}

impl PersistenceBackend {
    /// Open the configured SQLite store, or degrade to process-local state.
    pub async fn probe(config: &DatabaseConfig) -> Self {
        let url = database_url(&config.path);
        match initialize_database(&url, Some(PoolConfig::from(config))).await {
            Ok(pool) => {
                tracing::info!(database = %config.path, "using sqlite persistence");
                Self {
                    kind: BackendKind::Sqlite,
                    sessions: Arc::new(SqliteSessionRepository::new(pool.clone())),
                    idempotency: Arc::new(SqliteIdempotencyRepository::new(pool.clone())),
                    scores: Arc::new(SqliteScoreRepository::new(pool)),
                }
            }
            Err(e) => {
                tracing::warn!(
                    database = %config.path,
                    error = %e,
                    "sqlite store unavailable; falling back to in-memory persistence (state will not survive restart)"
                );
                Self::in_memory(Arc::new(InMemoryStore::new()))
            }
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            kind: BackendKind::InMemory,
            sessions: store.clone(),
            idempotency: store.clone(),
            scores: store,
        }
    }
}
