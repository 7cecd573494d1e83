//! Proposal (change request) creation.
//!
//! One reviewable change per session, guarded by the idempotency record
//! `create_proposal:<session_id>`. Until the change request is opened, any
//! failure marks the record `failed` so a later trigger can retry. Once it
//! is open the record is completed first, so a crash in the bookkeeping
//! that follows can never lead to a second change request.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::description::{self, DescriptionInput};
use super::detector_set::{DetectionReport, SourceFile, ViolationDetectorSet};
use super::idempotency_guard::{AcquireOutcome, Claim, IdempotencyGuard};
use super::threshold_gate::{ThresholdGate, ThresholdReason};
use super::workflow_aggregator::WorkflowAggregator;
use crate::domain::errors::DomainError;
use crate::domain::models::{ChangeType, ProposalRef, Session, SessionChange};
use crate::domain::ports::{SessionRepository, VcsAdapter};

/// Idempotency operation name for proposal creation.
pub const CREATE_PROPOSAL: &str = "create_proposal";

/// Steps of a proposal attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStep {
    Acquire,
    FetchChanges,
    Detect,
    Describe,
    CreateBranch,
    Commit,
    Push,
    OpenChangeRequest,
}

impl ProposalStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::FetchChanges => "fetch_changes",
            Self::Detect => "detect",
            Self::Describe => "describe",
            Self::CreateBranch => "create_branch",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::OpenChangeRequest => "open_change_request",
        }
    }
}

impl std::fmt::Display for ProposalStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {session_id} is below proposal thresholds: {reason}")]
    BelowThreshold { session_id: String, reason: ThresholdReason },

    #[error("Proposal for session {0} is already being created")]
    InFlight(String),

    #[error("Proposal for session {session_id} failed at {step}: {message}")]
    StepFailed {
        session_id: String,
        step: ProposalStep,
        message: String,
    },
}

impl ProposalError {
    fn step(session_id: &str, step: ProposalStep, err: impl std::fmt::Display) -> Self {
        Self::StepFailed {
            session_id: session_id.to_string(),
            step,
            message: err.to_string(),
        }
    }

    /// The step that failed, for step failures.
    pub fn failed_step(&self) -> Option<ProposalStep> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl From<ProposalError> for DomainError {
    fn from(err: ProposalError) -> Self {
        match err {
            ProposalError::SessionNotFound(id) => DomainError::SessionNotFound(id),
            ProposalError::InFlight(id) => DomainError::ConcurrencyConflict {
                operation: CREATE_PROPOSAL.to_string(),
                identifier: id,
            },
            other => DomainError::VcsError(other.to_string()),
        }
    }
}

/// Everything produced by a fresh proposal.
#[derive(Debug, Clone)]
pub struct CreatedProposal {
    pub proposal: ProposalRef,
    pub session_id: String,
    pub branch: String,
    pub changed_files: Vec<String>,
    pub description: String,
    pub detection: DetectionReport,
}

#[derive(Debug, Clone)]
pub enum ProposalOutcome {
    Created(Box<CreatedProposal>),
    /// An earlier attempt already opened this change request.
    Replayed(ProposalRef),
}

impl ProposalOutcome {
    pub fn proposal(&self) -> &ProposalRef {
        match self {
            Self::Created(created) => &created.proposal,
            Self::Replayed(proposal) => proposal,
        }
    }
}

pub struct ProposalCreator {
    guard: IdempotencyGuard,
    aggregator: Arc<WorkflowAggregator>,
    sessions: Arc<dyn SessionRepository>,
    vcs: Arc<dyn VcsAdapter>,
    detectors: Arc<ViolationDetectorSet>,
    gate: ThresholdGate,
    workspace_root: PathBuf,
    branch_prefix: String,
}

impl ProposalCreator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guard: IdempotencyGuard,
        aggregator: Arc<WorkflowAggregator>,
        sessions: Arc<dyn SessionRepository>,
        vcs: Arc<dyn VcsAdapter>,
        detectors: Arc<ViolationDetectorSet>,
        gate: ThresholdGate,
        workspace_root: impl Into<PathBuf>,
        branch_prefix: impl Into<String>,
    ) -> Self {
        Self {
            guard,
            aggregator,
            sessions,
            vcs,
            detectors,
            gate,
            workspace_root: workspace_root.into(),
            branch_prefix: branch_prefix.into(),
        }
    }

    /// Create the change request for `session_id`.
    ///
    /// Without `force` the session must pass the threshold gate. Concurrent
    /// or repeated calls for one session open at most one change request.
    #[instrument(skip(self))]
    pub async fn create(&self, session_id: &str, force: bool) -> Result<ProposalOutcome, ProposalError> {
        let session = self
            .aggregator
            .get(session_id)
            .await
            .map_err(|e| ProposalError::step(session_id, ProposalStep::FetchChanges, e))?
            .ok_or_else(|| ProposalError::SessionNotFound(session_id.to_string()))?;

        if let Some(existing) = &session.proposal {
            return Ok(ProposalOutcome::Replayed(existing.clone()));
        }

        if !force {
            let decision = self.gate.should_create(&session, chrono::Utc::now());
            if !decision.should_create {
                return Err(ProposalError::BelowThreshold {
                    session_id: session_id.to_string(),
                    reason: decision.reason,
                });
            }
        }

        let claim = match self.guard.acquire(CREATE_PROPOSAL, session_id).await {
            AcquireOutcome::Acquired(claim) => claim,
            AcquireOutcome::InFlight => return Err(ProposalError::InFlight(session_id.to_string())),
            AcquireOutcome::Completed(result) => {
                let replay = match result.as_ref().and_then(ProposalRef::from_record) {
                    Some(replay) => replay,
                    None => self.replay_from_session(session_id).await?,
                };
                debug!(session_id, url = %replay.url, "replaying completed proposal");
                return Ok(ProposalOutcome::Replayed(replay));
            }
        };

        match self.materialize(&session).await {
            Ok(created) => {
                self.finalize(&claim, &created).await;
                info!(session_id, url = %created.proposal.url, "proposal created");
                Ok(ProposalOutcome::Created(Box::new(created)))
            }
            Err(err) => {
                warn!(session_id, error = %err, "proposal attempt failed");
                if let Err(e) = self.guard.fail(&claim, &err.to_string()).await {
                    warn!(session_id, error = %e, "could not record proposal failure");
                }
                Err(err)
            }
        }
    }

    /// Completed record without a usable payload: the session itself is the
    /// other place the reference is kept.
    async fn replay_from_session(&self, session_id: &str) -> Result<ProposalRef, ProposalError> {
        let session = self
            .aggregator
            .get(session_id)
            .await
            .map_err(|e| ProposalError::step(session_id, ProposalStep::Acquire, e))?;
        session.and_then(|s| s.proposal).ok_or_else(|| {
            ProposalError::step(
                session_id,
                ProposalStep::Acquire,
                "proposal already created but its reference is not recorded",
            )
        })
    }

    /// Everything up to and including opening the change request.
    async fn materialize(&self, session: &Session) -> Result<CreatedProposal, ProposalError> {
        let id = session.id.as_str();

        let changes = self
            .sessions
            .list_unprocessed_changes(id)
            .await
            .map_err(|e| ProposalError::step(id, ProposalStep::FetchChanges, e))?;
        let changed_files: Vec<String> = session.files.iter().cloned().collect();

        let sources = self.read_sources(&changed_files, &changes).await;
        let detectors = Arc::clone(&self.detectors);
        let detection = tokio::task::spawn_blocking(move || detectors.detect_all(&sources))
            .await
            .map_err(|e| ProposalError::step(id, ProposalStep::Detect, e))?;

        let summary = detection.summary();
        let input = DescriptionInput {
            session,
            changes: &changes,
            violations: Some(&summary),
        };
        let body = description::generate(&input);
        if body.trim().is_empty() {
            return Err(ProposalError::step(id, ProposalStep::Describe, "empty description"));
        }
        let title = description::title_for(session);

        let branch = format!("{}{}", self.branch_prefix, id);
        self.vcs
            .create_branch(&branch)
            .await
            .map_err(|e| ProposalError::step(id, ProposalStep::CreateBranch, e))?;
        self.vcs
            .commit(&branch, &changed_files, &description::commit_message(session))
            .await
            .map_err(|e| ProposalError::step(id, ProposalStep::Commit, e))?;
        self.vcs
            .push(&branch)
            .await
            .map_err(|e| ProposalError::step(id, ProposalStep::Push, e))?;
        let opened = self
            .vcs
            .open_change_request(&branch, &title, &body)
            .await
            .map_err(|e| ProposalError::step(id, ProposalStep::OpenChangeRequest, e))?;

        Ok(CreatedProposal {
            proposal: ProposalRef::new(opened.id, opened.url),
            session_id: id.to_string(),
            branch,
            changed_files,
            description: body,
            detection,
        })
    }

    /// Bookkeeping after the change request exists. Failures here are
    /// logged only; the completed record already prevents a duplicate.
    async fn finalize(&self, claim: &Claim, created: &CreatedProposal) {
        let id = created.session_id.as_str();
        if let Err(e) = self.guard.complete(claim, &created.proposal.to_record()).await {
            warn!(session_id = id, error = %e, "could not record proposal completion");
        }

        match self.sessions.list_unprocessed_changes(id).await {
            Ok(changes) => {
                let ids: Vec<i64> = changes.iter().map(|c| c.id).collect();
                if let Err(e) = self.sessions.mark_changes_processed(&ids).await {
                    warn!(session_id = id, error = %e, "could not mark session changes processed");
                }
            }
            Err(e) => warn!(session_id = id, error = %e, "could not list session changes"),
        }

        if let Err(e) = self.aggregator.attach_proposal(id, created.proposal.clone()).await {
            warn!(session_id = id, error = %e, "could not attach proposal to session");
        }
    }

    /// Read the current content of changed files. Files removed since are
    /// skipped; so are unreadable ones, with a warning.
    async fn read_sources(&self, files: &[String], changes: &[SessionChange]) -> Vec<SourceFile> {
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            let removed = changes
                .iter()
                .rev()
                .find(|c| &c.event.path == path)
                .is_some_and(|c| c.event.change_type == ChangeType::Removed);
            if removed {
                continue;
            }
            match tokio::fs::read_to_string(self.workspace_root.join(path)).await {
                Ok(content) => sources.push(SourceFile::new(path.clone(), content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path, "changed file no longer exists; not scanned");
                }
                Err(e) => warn!(path = %path, error = %e, "could not read changed file; not scanned"),
            }
        }
        sources
    }
}
