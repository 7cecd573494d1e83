//! Session and score persistence through the SQLite backend.

mod common;

use changeward::adapters::{BackendKind, PersistenceBackend};
use changeward::domain::models::{ChangeType, FileChangeEvent, ProposalRef, SessionStatus, WorkflowConfig};
use changeward::WorkflowAggregator;

use common::{at, files, sqlite_config, t0};

#[tokio::test]
async fn test_active_sessions_are_restored_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = sqlite_config(&dir);

    let original = {
        let backend = PersistenceBackend::probe(&config).await;
        let agg = WorkflowAggregator::new(backend.sessions.clone(), &WorkflowConfig::default());
        let id = agg.add_task("edit_code", files(&["src/a.rs"]), 0.9, t0()).await;
        agg.add_task("run_tests", files(&["src/a.rs", "tests/a.rs"]), 0.8, at(60)).await;
        agg.get(&id).await.unwrap().unwrap()
    };
    let id = original.id.clone();

    let backend = PersistenceBackend::probe(&config).await;
    assert_eq!(backend.kind, BackendKind::Sqlite);
    let agg = WorkflowAggregator::new(backend.sessions.clone(), &WorkflowConfig::default());
    assert_eq!(agg.load().await, 1);

    let session = agg.get(&id).await.unwrap().unwrap();
    assert_eq!(session, original);
    assert_eq!(session.tasks.len(), 2);
    assert_eq!(session.total_files(), 2);
    assert_eq!(session.last_activity, at(60));

    // A continuation after restart still joins the restored session.
    let joined = agg.add_task("fix_bug", files(&["tests/a.rs"]), 0.7, at(120)).await;
    assert_eq!(joined, id);
}

#[tokio::test]
async fn test_completed_session_with_proposal_reloads_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let config = sqlite_config(&dir);

    let original = {
        let backend = PersistenceBackend::probe(&config).await;
        let agg = WorkflowAggregator::new(backend.sessions.clone(), &WorkflowConfig::default());
        let id = agg.add_task("refactor", files(&["src/lib.rs"]), 0.75, t0()).await;
        agg.attach_proposal(&id, ProposalRef::new("42", "https://example.com/pull/42"))
            .await
            .unwrap();
        agg.get(&id).await.unwrap().unwrap()
    };
    assert_eq!(original.status, SessionStatus::Completed);

    let backend = PersistenceBackend::probe(&config).await;
    let agg = WorkflowAggregator::new(backend.sessions.clone(), &WorkflowConfig::default());
    assert_eq!(agg.load().await, 0);
    assert_eq!(agg.get(&original.id).await.unwrap(), Some(original));
}

#[tokio::test]
async fn test_change_records_are_consumed_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = PersistenceBackend::probe(&sqlite_config(&dir)).await;
    let agg = WorkflowAggregator::new(backend.sessions.clone(), &WorkflowConfig::default());
    let id = agg.add_task("edit_code", files(&["src/a.rs"]), 1.0, t0()).await;

    let events = vec![
        FileChangeEvent::new("src/a.rs", ChangeType::Modified, t0()).with_lines(4, 1),
        FileChangeEvent::new("src/b.rs", ChangeType::Added, at(1)).with_lines(10, 0),
    ];
    backend.sessions.record_changes(&id, &events).await.unwrap();

    let pending = backend.sessions.list_unprocessed_changes(&id).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].event.path, "src/a.rs");

    let ids: Vec<i64> = pending.iter().map(|c| c.id).collect();
    backend.sessions.mark_changes_processed(&ids).await.unwrap();
    assert!(backend.sessions.list_unprocessed_changes(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_sweep_completes_persisted_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let backend = PersistenceBackend::probe(&sqlite_config(&dir)).await;
    let agg = WorkflowAggregator::new(backend.sessions.clone(), &WorkflowConfig::default());
    let id = agg.add_task("edit_code", files(&["src/a.rs"]), 1.0, t0()).await;

    let completed = agg.cleanup_stale_at(30, at(31 * 60)).await;
    assert_eq!(completed, vec![id.clone()]);

    let stored = backend.sessions.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert!(backend
        .sessions
        .list_by_status(SessionStatus::Active)
        .await
        .unwrap()
        .is_empty());
}
