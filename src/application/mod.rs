//! Application layer: wires the services into the running pipeline.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, ProposalReport, RunSummary};
