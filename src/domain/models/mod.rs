//! Domain models for the change aggregation, proposal and scoring pipeline.

pub mod change;
pub mod config;
pub mod idempotency;
pub mod proposal;
pub mod score;
pub mod session;
pub mod violation;

pub use change::{ChangeBatch, ChangeType, FileChangeEvent, FlushReason, SessionChange};
pub use config::{
    BufferConfig, CategoryWeight, Config, DatabaseConfig, GitHubConfig, IdempotencyConfig,
    LoggingConfig, ScoringConfig, ThresholdConfig, VcsConfig, WorkerConfig, WorkflowConfig,
};
pub use idempotency::{idempotency_key, IdempotencyRecord, IdempotencyStatus, DEFAULT_TTL_HOURS};
pub use proposal::ProposalRef;
pub use score::{Decision, PrScoreResult, ScoreCategory};
pub use session::{
    derive_session_id, is_permitted_continuation, time_bucket, Session, SessionStatus, Task,
};
pub use violation::{Finding, Severity, ViolationResult, ViolationSummary};
