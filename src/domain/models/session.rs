//! Session (workflow) domain model.
//!
//! A session groups tasks that are believed to be one unit of developer
//! work. Sessions own their tasks exclusively; tasks are append-only.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::proposal::ProposalRef;

/// Width of a time-window bucket in minutes.
pub const BUCKET_MINUTES: i64 = 10;

/// Number of hex characters kept from the session id digest.
pub const SESSION_ID_WIDTH: usize = 16;

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One recognized step of work inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub lines_changed: u64,
}

impl Task {
    pub fn new(
        task_type: impl Into<String>,
        files: Vec<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            timestamp,
            files,
            confidence,
            lines_changed: 0,
        }
    }

    pub fn with_lines(mut self, lines_changed: u64) -> Self {
        self.lines_changed = lines_changed;
        self
    }
}

/// A logical grouping of tasks believed to be one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub files: BTreeSet<String>,
    pub tasks: Vec<Task>,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub time_window_bucket: i64,
    pub status: SessionStatus,
    pub proposal: Option<ProposalRef>,
}

impl Session {
    /// Start a session from its first task.
    pub fn start(id: impl Into<String>, task: Task) -> Self {
        let timestamp = task.timestamp;
        Self {
            id: id.into(),
            files: task.files.iter().cloned().collect(),
            tasks: vec![task],
            start_time: timestamp,
            last_activity: timestamp,
            time_window_bucket: time_bucket(timestamp),
            status: SessionStatus::Active,
            proposal: None,
        }
    }

    /// Append a task, union its files and refresh `last_activity`.
    pub fn add_task(&mut self, task: Task) {
        self.files.extend(task.files.iter().cloned());
        self.last_activity = task.timestamp;
        self.tasks.push(task);
    }

    pub fn last_task_type(&self) -> Option<&str> {
        self.tasks.last().map(|t| t.task_type.as_str())
    }

    pub fn overlaps(&self, files: &[String]) -> bool {
        files.iter().any(|f| self.files.contains(f))
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_lines(&self) -> u64 {
        self.tasks.iter().map(|t| t.lines_changed).sum()
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
    }
}

/// `floor(epoch_minutes / 10)` for the given instant.
pub fn time_bucket(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp().div_euclid(60).div_euclid(BUCKET_MINUTES)
}

/// Derive a stable session id from a file set and bucket.
///
/// `attempt` is mixed in only when a previous attempt collided with an
/// already-known session.
pub fn derive_session_id(files: &[String], bucket: i64, attempt: u32) -> String {
    let mut sorted: Vec<&str> = files.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut material = format!("{}:{}", sorted.join(":"), bucket);
    if attempt > 0 {
        material.push_str(&format!(":{attempt}"));
    }

    let digest = Sha256::digest(material.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(SESSION_ID_WIDTH);
    id
}

/// Allowed next task types for a given task type.
///
/// `None` means the task type has no entry and permits anything.
fn allowed_next(task_type: &str) -> Option<&'static [&'static str]> {
    let next: &'static [&'static str] = match task_type {
        "edit_code" => &[
            "edit_code", "run_tests", "write_tests", "fix_bug", "refactor", "write_docs",
            "configure", "commit",
        ],
        "write_tests" => &["run_tests", "edit_code", "write_tests", "fix_bug", "commit"],
        "run_tests" => &["fix_bug", "edit_code", "write_tests", "run_tests", "refactor", "commit"],
        "fix_bug" => &["run_tests", "edit_code", "fix_bug", "write_tests", "commit"],
        "refactor" => &["run_tests", "edit_code", "refactor", "write_tests", "commit"],
        "write_docs" => &["write_docs", "edit_code", "commit"],
        "configure" => &["configure", "edit_code", "run_tests", "commit"],
        "commit" => &["push", "edit_code"],
        _ => return None,
    };
    Some(next)
}

/// Whether `next` may follow `previous` inside one session.
pub fn is_permitted_continuation(previous: Option<&str>, next: &str) -> bool {
    match previous.and_then(allowed_next) {
        Some(allowed) => allowed.contains(&next),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_time_bucket_is_ten_minute_floor() {
        assert_eq!(time_bucket(at(0)), 0);
        assert_eq!(time_bucket(at(599)), 0);
        assert_eq!(time_bucket(at(600)), 1);
        assert_eq!(time_bucket(at(-1)), -1);
    }

    #[test]
    fn test_session_id_ignores_file_order() {
        let a = derive_session_id(&["b.rs".into(), "a.rs".into()], 42, 0);
        let b = derive_session_id(&["a.rs".into(), "b.rs".into()], 42, 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), SESSION_ID_WIDTH);
        assert_ne!(a, derive_session_id(&["a.rs".into(), "b.rs".into()], 43, 0));
        assert_ne!(a, derive_session_id(&["a.rs".into(), "b.rs".into()], 42, 1));
    }

    #[test]
    fn test_continuation_table() {
        assert!(is_permitted_continuation(Some("edit_code"), "run_tests"));
        assert!(!is_permitted_continuation(Some("commit"), "write_docs"));
        assert!(is_permitted_continuation(Some("lint"), "anything"));
        assert!(is_permitted_continuation(None, "commit"));
    }

    #[test]
    fn test_add_task_unions_files_and_tracks_lines() {
        let mut session = Session::start(
            "s1",
            Task::new("edit_code", vec!["a.rs".into()], 1.0, at(1_000)).with_lines(10),
        );
        session.add_task(
            Task::new("run_tests", vec!["a.rs".into(), "b.rs".into()], 0.5, at(1_100)).with_lines(5),
        );

        assert_eq!(session.total_files(), 2);
        assert_eq!(session.total_lines(), 15);
        assert_eq!(session.last_activity, at(1_100));
        assert_eq!(session.start_time, at(1_000));
        assert_eq!(session.last_task_type(), Some("run_tests"));
    }
}
