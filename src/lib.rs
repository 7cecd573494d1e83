//! changeward - groups raw file changes into work sessions and turns them
//! into scored change requests.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, port traits and the error taxonomy
//! - **Adapters** (`adapters`): SQLite and in-memory stores, git/GitHub, detectors
//! - **Service Layer** (`services`): buffer, aggregator, gate, idempotency guard,
//!   proposal creator and scoring engine
//! - **Application Layer** (`application`): the orchestrator that wires them
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use changeward::adapters::{vcs::MockVcsAdapter, InMemoryStore, PersistenceBackend};
//! use changeward::{Config, Orchestrator, ViolationDetectorSet};
//!
//! let backend = PersistenceBackend::in_memory(Arc::new(InMemoryStore::new()));
//! let orchestrator = Orchestrator::new(
//!     Config::default(),
//!     backend,
//!     Arc::new(MockVcsAdapter::new()),
//!     ViolationDetectorSet::builtin()?,
//! );
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Orchestrator, ProposalReport, RunSummary};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ChangeBatch, ChangeType, Config, Decision, FileChangeEvent, PrScoreResult, ProposalRef,
    Session, SessionStatus, Task,
};
pub use domain::ports::{IdempotencyRepository, ScoreRepository, SessionRepository, VcsAdapter};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    IdempotencyGuard, ProposalCreator, ScoringEngine, ThresholdGate, ViolationDetectorSet,
    WorkflowAggregator,
};
