//! Common test utilities for integration tests
//!
//! Shared fixtures for building an in-memory or SQLite-backed pipeline.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use changeward::adapters::vcs::MockVcsAdapter;
use changeward::adapters::{InMemoryStore, PersistenceBackend};
use changeward::domain::models::{ChangeType, Config, DatabaseConfig, FileChangeEvent};
use changeward::{Orchestrator, ViolationDetectorSet};

/// Fixed reference instant, early in a 10-minute bucket.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 1, 0).unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

pub fn files(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| (*p).to_string()).collect()
}

pub fn modified(path: &str, lines: u32) -> FileChangeEvent {
    FileChangeEvent::new(path, ChangeType::Modified, Utc::now()).with_lines(lines, 0)
}

/// Config whose workspace is `root`, proposing once `min_files` are touched.
pub fn config_for(root: &Path, min_files: usize) -> Config {
    let mut config = Config::default();
    config.vcs.repo_root = root.display().to_string();
    config.threshold.min_files = min_files;
    config
}

/// Write files into a temporary workspace.
pub fn workspace(entries: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for (path, content) in entries {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create workspace dir");
        }
        std::fs::write(full, content).expect("Failed to write workspace file");
    }
    dir
}

pub fn sqlite_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("changeward.db").display().to_string(),
        max_connections: 4,
    }
}

pub fn memory_orchestrator(
    config: Config,
    vcs: Arc<MockVcsAdapter>,
) -> (Arc<Orchestrator>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let backend = PersistenceBackend::in_memory(store.clone());
    let detectors = ViolationDetectorSet::builtin().expect("built-in detectors compile");
    (Arc::new(Orchestrator::new(config, backend, vcs, detectors)), store)
}

/// Initialize a test subscriber; safe to call from several tests.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
