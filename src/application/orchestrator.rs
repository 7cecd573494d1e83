//! Pipeline orchestrator.
//!
//! Owns the aggregator, gate, proposal creator and scoring engine and wires
//! them into one event-driven loop:
//!
//! ```text
//!  observer ──mpsc──▶ change buffer ──mpsc──▶ Orchestrator::run
//!                                                  │
//!                       ingest batch ◀─────────────┤
//!                       threshold gate             │ cleanup interval
//!                             │                    │
//!                             ▼                    ▼
//!                 proposal + scoring jobs ◀── threshold re-check,
//!                 (JoinSet, Semaphore)        then sweep_stale
//! ```
//!
//! The interval re-evaluates every active session so the max-wait trigger
//! fires for sessions that receive no further events. Sessions with a job
//! in flight are excluded from the stale sweep.
//!
//! Proposal jobs never run on the event path: they are spawned onto a
//! `JoinSet` and bounded by a semaphore, so a slow push cannot stall event
//! intake.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::PersistenceBackend;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ChangeBatch, Config, FileChangeEvent, PrScoreResult, ProposalRef, Session, SessionStatus,
};
use crate::domain::ports::VcsAdapter;
use crate::services::{
    run_change_buffer, IdempotencyGuard, ProposalCreator, ProposalError, ProposalOutcome,
    ScoringEngine, ThresholdGate, ViolationDetectorSet, WorkflowAggregator,
};

const BATCH_CHANNEL_CAPACITY: usize = 64;

type ProposalJobs = JoinSet<(String, Result<ProposalReport, ProposalError>)>;

/// Result of one proposal job.
#[derive(Debug, Clone)]
pub struct ProposalReport {
    pub session_id: String,
    pub proposal: ProposalRef,
    /// Whether an earlier attempt had already opened the change request.
    pub replayed: bool,
    pub score: Option<PrScoreResult>,
}

/// Counters for one `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub proposals_created: usize,
    pub proposals_replayed: usize,
    pub proposals_failed: usize,
    pub stale_completed: usize,
}

pub struct Orchestrator {
    config: Config,
    backend: PersistenceBackend,
    aggregator: Arc<WorkflowAggregator>,
    gate: ThresholdGate,
    creator: ProposalCreator,
    scoring: ScoringEngine,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        backend: PersistenceBackend,
        vcs: Arc<dyn VcsAdapter>,
        detectors: ViolationDetectorSet,
    ) -> Self {
        let aggregator = Arc::new(WorkflowAggregator::new(backend.sessions.clone(), &config.workflow));
        let gate = ThresholdGate::new(config.threshold.clone());
        let guard = IdempotencyGuard::new(backend.idempotency.clone(), config.idempotency.ttl_hours);
        let creator = ProposalCreator::new(
            guard,
            aggregator.clone(),
            backend.sessions.clone(),
            vcs,
            Arc::new(detectors),
            gate.clone(),
            &config.vcs.repo_root,
            &config.vcs.branch_prefix,
        );
        let scoring = ScoringEngine::new(config.scoring.clone(), backend.scores.clone());

        Self {
            config,
            backend,
            aggregator,
            gate,
            creator,
            scoring,
        }
    }

    pub fn aggregator(&self) -> &Arc<WorkflowAggregator> {
        &self.aggregator
    }

    /// Restore active sessions from the store.
    pub async fn start(&self) -> usize {
        self.aggregator.load().await
    }

    /// Consume events until the sender side closes, then drain the buffer
    /// and wait for every spawned proposal job.
    pub async fn run(self: Arc<Self>, events: mpsc::Receiver<FileChangeEvent>) -> RunSummary {
        let (batch_tx, mut batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let buffer = tokio::spawn(run_change_buffer(self.config.buffer.clone(), events, batch_tx));

        let permits = Arc::new(Semaphore::new(self.config.workers.max_concurrent_proposals.max(1)));
        let mut jobs: ProposalJobs = JoinSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut summary = RunSummary::default();

        let mut cleanup = tokio::time::interval(Duration::from_secs(
            self.config.workflow.cleanup_interval_seconds.max(1),
        ));
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        cleanup.tick().await;

        info!("orchestrator running");
        loop {
            tokio::select! {
                received = batch_rx.recv() => match received {
                    Some(batch) => {
                        summary.batches += 1;
                        if let Some(session_id) = self.handle_batch(&batch).await {
                            self.spawn_proposal(session_id, &permits, &mut jobs, &mut in_flight);
                        }
                    }
                    None => break,
                },
                _ = cleanup.tick() => {
                    let now = Utc::now();
                    for session_id in self.due_sessions(now).await {
                        self.spawn_proposal(session_id, &permits, &mut jobs, &mut in_flight);
                    }
                    let completed = self
                        .aggregator
                        .sweep_stale(self.config.workflow.stale_after_minutes, now, &in_flight)
                        .await;
                    summary.stale_completed += completed.len();
                }
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                    record_job(joined, &mut in_flight, &mut summary);
                }
            }
        }

        while let Some(joined) = jobs.join_next().await {
            record_job(joined, &mut in_flight, &mut summary);
        }
        if let Err(e) = buffer.await {
            error!(error = %e, "change buffer task ended abnormally");
        }

        info!(?summary, "orchestrator stopped");
        summary
    }

    /// Start a bounded proposal job unless one is already running for the
    /// session.
    fn spawn_proposal(
        self: &Arc<Self>,
        session_id: String,
        permits: &Arc<Semaphore>,
        jobs: &mut ProposalJobs,
        in_flight: &mut HashSet<String>,
    ) {
        if !in_flight.insert(session_id.clone()) {
            return;
        }
        let this = Arc::clone(self);
        let permits = Arc::clone(permits);
        jobs.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => this.propose(&session_id, false).await,
                Err(e) => Err(ProposalError::InFlight(format!("{session_id} ({e})"))),
            };
            (session_id, result)
        });
    }

    /// Active sessions without a proposal that now pass the gate.
    async fn due_sessions(&self, now: chrono::DateTime<Utc>) -> Vec<String> {
        self.aggregator
            .list_active()
            .await
            .into_iter()
            .filter(|session| session.proposal.is_none())
            .filter(|session| {
                let decision = self.gate.should_create(session, now);
                if decision.should_create {
                    debug!(session_id = %session.id, reason = %decision.reason, "threshold met on interval");
                }
                decision.should_create
            })
            .map(|session| session.id)
            .collect()
    }

    /// Ingest a batch; returns the session if it is now worth proposing.
    async fn handle_batch(&self, batch: &ChangeBatch) -> Option<String> {
        let session_id = self.aggregator.ingest_batch(batch).await?;
        let session = match self.aggregator.get(&session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "could not read session after ingest");
                return None;
            }
        };
        if !session.is_active() {
            return None;
        }

        let decision = self.gate.should_create(&session, Utc::now());
        debug!(
            session_id = %session_id,
            should_create = decision.should_create,
            reason = %decision.reason,
            "threshold evaluated"
        );
        decision.should_create.then_some(session_id)
    }

    /// Create (or replay) the proposal for a session and score it.
    ///
    /// `force` skips the threshold check. Fresh proposals are scored from
    /// their own detection results; replays return the last stored score.
    #[instrument(skip(self))]
    pub async fn propose(&self, session_id: &str, force: bool) -> Result<ProposalReport, ProposalError> {
        match self.creator.create(session_id, force).await? {
            ProposalOutcome::Created(created) => {
                let score = self
                    .scoring
                    .score(
                        session_id,
                        &created.changed_files,
                        &created.description,
                        created.detection.violations.clone(),
                    )
                    .await;
                Ok(ProposalReport {
                    session_id: session_id.to_string(),
                    proposal: created.proposal,
                    replayed: false,
                    score: Some(score),
                })
            }
            ProposalOutcome::Replayed(proposal) => {
                let score = match self.backend.scores.latest_for(session_id).await {
                    Ok(score) => score,
                    Err(e) => {
                        warn!(session_id, error = %e, "could not load stored score");
                        None
                    }
                };
                Ok(ProposalReport {
                    session_id: session_id.to_string(),
                    proposal,
                    replayed: true,
                    score,
                })
            }
        }
    }

    pub async fn cleanup(&self, max_age_minutes: u64) -> Vec<String> {
        self.aggregator.cleanup_stale(max_age_minutes).await
    }

    /// Sessions from the store, active first.
    pub async fn list_sessions(&self, include_completed: bool) -> DomainResult<Vec<Session>> {
        let mut sessions = self.backend.sessions.list_by_status(SessionStatus::Active).await?;
        if include_completed {
            sessions.extend(self.backend.sessions.list_by_status(SessionStatus::Completed).await?);
        }
        Ok(sessions)
    }
}

fn record_job(
    joined: Result<(String, Result<ProposalReport, ProposalError>), JoinError>,
    in_flight: &mut HashSet<String>,
    summary: &mut RunSummary,
) {
    match joined {
        Ok((session_id, result)) => {
            in_flight.remove(&session_id);
            match result {
                Ok(report) if report.replayed => summary.proposals_replayed += 1,
                Ok(report) => {
                    summary.proposals_created += 1;
                    info!(
                        session_id = %session_id,
                        url = %report.proposal.url,
                        decision = report.score.as_ref().map_or("unscored", |s| s.decision.as_str()),
                        "proposal job finished"
                    );
                }
                Err(ProposalError::InFlight(_)) => {
                    debug!(session_id = %session_id, "proposal already in flight elsewhere");
                }
                Err(e) => {
                    summary.proposals_failed += 1;
                    warn!(session_id = %session_id, error = %e, "proposal job failed");
                }
            }
        }
        Err(e) => {
            summary.proposals_failed += 1;
            error!(error = %e, "proposal job panicked or was cancelled");
        }
    }
}
