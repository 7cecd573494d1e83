//! Racing triggers must open at most one change request per session.

mod common;

use std::sync::Arc;
use std::time::Duration;

use changeward::adapters::vcs::MockVcsAdapter;
use changeward::adapters::{BackendKind, PersistenceBackend};
use changeward::services::{AcquireOutcome, IdempotencyGuard, ProposalError, CREATE_PROPOSAL};
use changeward::{Orchestrator, ViolationDetectorSet};
use serde_json::json;

use common::{config_for, memory_orchestrator, sqlite_config, workspace};

#[tokio::test]
async fn test_concurrent_acquire_on_sqlite_has_single_owner() {
    let dir = tempfile::tempdir().unwrap();
    let backend = PersistenceBackend::probe(&sqlite_config(&dir)).await;
    assert_eq!(backend.kind, BackendKind::Sqlite);
    let guard = IdempotencyGuard::new(backend.idempotency.clone(), 24);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move { guard.acquire(CREATE_PROPOSAL, "session-1").await }));
    }
    let mut claims = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            AcquireOutcome::Acquired(claim) => claims.push(claim),
            AcquireOutcome::InFlight => {}
            AcquireOutcome::Completed(_) => panic!("nothing has completed yet"),
        }
    }
    assert_eq!(claims.len(), 1);

    guard
        .complete(&claims[0], &json!({"id": "7", "url": "mock://7"}))
        .await
        .unwrap();
    assert_eq!(
        guard.acquire(CREATE_PROPOSAL, "session-1").await,
        AcquireOutcome::Completed(Some(json!({"id": "7", "url": "mock://7"})))
    );
}

#[tokio::test]
async fn test_concurrent_manual_triggers_open_one_change_request() {
    let ws = workspace(&[("src/a.rs", "pub fn a() {}\n")]);
    let vcs = Arc::new(MockVcsAdapter::new().with_delay(Duration::from_millis(20)));
    let (orch, _store) = memory_orchestrator(config_for(ws.path(), 10), vcs.clone());
    let session_id = orch
        .aggregator()
        .add_task("edit_code", common::files(&["src/a.rs"]), 1.0, chrono::Utc::now())
        .await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let orch = Arc::clone(&orch);
        let session_id = session_id.clone();
        handles.push(tokio::spawn(async move { orch.propose(&session_id, true).await }));
    }

    let mut created = 0;
    let mut urls = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(report) => {
                if !report.replayed {
                    created += 1;
                }
                urls.push(report.proposal.url);
            }
            Err(ProposalError::InFlight(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(vcs.opened_count(), 1);
    urls.dedup();
    assert_eq!(urls.len(), 1);
}

#[tokio::test]
async fn test_completed_proposal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ws = workspace(&[("src/a.rs", "pub fn a() {}\n")]);
    let mut config = config_for(ws.path(), 10);
    config.database = sqlite_config(&dir);

    let first_vcs = Arc::new(MockVcsAdapter::new());
    let session_id = {
        let backend = PersistenceBackend::probe(&config.database).await;
        let orch = Orchestrator::new(
            config.clone(),
            backend,
            first_vcs.clone(),
            ViolationDetectorSet::builtin().unwrap(),
        );
        let id = orch
            .aggregator()
            .add_task("edit_code", common::files(&["src/a.rs"]), 1.0, chrono::Utc::now())
            .await;
        orch.propose(&id, true).await.unwrap();
        id
    };

    let second_vcs = Arc::new(MockVcsAdapter::new());
    let backend = PersistenceBackend::probe(&config.database).await;
    let orch = Orchestrator::new(config, backend, second_vcs.clone(), ViolationDetectorSet::builtin().unwrap());
    assert_eq!(orch.start().await, 0);

    let report = orch.propose(&session_id, true).await.unwrap();
    assert!(report.replayed);
    assert!(report.score.is_some());
    assert_eq!(first_vcs.opened_count(), 1);
    assert!(second_vcs.calls().is_empty());
}
