//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that adapters must implement:
//! - SessionRepository: session state and per-session change records
//! - IdempotencyRepository: durable at-most-once records
//! - ScoreRepository: persisted scoring results
//! - VcsAdapter: branch/commit/push/open-change-request operations
//! - ViolationDetector: pure (path, content) -> findings functions
//!
//! Together the three repositories form the persistence adapter the
//! pipeline depends on; the domain never talks to a concrete store.

pub mod idempotency_repository;
pub mod score_repository;
pub mod session_repository;
pub mod vcs;
pub mod violation_detector;

pub use idempotency_repository::IdempotencyRepository;
pub use score_repository::ScoreRepository;
pub use session_repository::SessionRepository;
pub use vcs::{ChangeRequestRef, VcsAdapter, VcsError};
pub use violation_detector::{DetectorError, ViolationDetector};
