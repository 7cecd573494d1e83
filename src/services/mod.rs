//! Core pipeline services.
//!
//! Change events flow buffer → aggregator → gate → proposal creator →
//! scoring engine. Every service takes its collaborators by injection.

pub mod change_buffer;
pub mod description;
pub mod detector_set;
pub mod idempotency_guard;
pub mod proposal_creator;
pub mod scoring_engine;
pub mod task_classifier;
pub mod threshold_gate;
pub mod workflow_aggregator;

pub use change_buffer::{run_change_buffer, ChangeBuffer, DebounceTimer};
pub use detector_set::{DetectionReport, DetectorFailure, SourceFile, ViolationDetectorSet};
pub use idempotency_guard::{AcquireOutcome, Claim, IdempotencyGuard};
pub use proposal_creator::{
    CreatedProposal, ProposalCreator, ProposalError, ProposalOutcome, ProposalStep, CREATE_PROPOSAL,
};
pub use scoring_engine::{
    decide, stabilize, CategoryAnalyzer, ChangeSizeAnalyzer, ScoringEngine, TestCoverageAnalyzer,
};
pub use threshold_gate::{ThresholdDecision, ThresholdGate, ThresholdReason};
pub use workflow_aggregator::WorkflowAggregator;
