//! Recording VCS adapter for tests and dry runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{ChangeRequestRef, VcsAdapter, VcsError};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    CreateBranch(String),
    Commit { branch: String, files: Vec<String>, message: String },
    Push(String),
    OpenChangeRequest { branch: String, title: String, description: String },
}

impl VcsCall {
    fn step(&self) -> &'static str {
        match self {
            Self::CreateBranch(_) => "create_branch",
            Self::Commit { .. } => "commit",
            Self::Push(_) => "push",
            Self::OpenChangeRequest { .. } => "open_change_request",
        }
    }
}

/// A VCS adapter that performs no I/O.
///
/// Calls are recorded in order. `fail_on` makes the named step fail once
/// per call; `with_delay` makes every call sleep first, which widens race
/// windows in concurrency tests.
#[derive(Debug, Default)]
pub struct MockVcsAdapter {
    calls: Mutex<Vec<VcsCall>>,
    fail_on: Mutex<Option<&'static str>>,
    delay: Option<Duration>,
    next_id: AtomicU64,
}

impl MockVcsAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the given step (`create_branch`, `commit`, `push`,
    /// `open_change_request`) until cleared with `None`.
    pub fn fail_on(&self, step: Option<&'static str>) {
        if let Ok(mut guard) = self.fail_on.lock() {
            *guard = step;
        }
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn opened_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, VcsCall::OpenChangeRequest { .. }))
            .count()
    }

    async fn record(&self, call: VcsCall) -> Result<(), VcsError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let step = call.step();
        let failing = self.fail_on.lock().map(|f| *f == Some(step)).unwrap_or(false);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if failing {
            return Err(VcsError::CommandFailed {
                command: step.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("simulated {step} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VcsAdapter for MockVcsAdapter {
    async fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.record(VcsCall::CreateBranch(name.to_string())).await
    }

    async fn commit(&self, branch: &str, files: &[String], message: &str) -> Result<(), VcsError> {
        self.record(VcsCall::Commit {
            branch: branch.to_string(),
            files: files.to_vec(),
            message: message.to_string(),
        })
        .await
    }

    async fn push(&self, branch: &str) -> Result<(), VcsError> {
        self.record(VcsCall::Push(branch.to_string())).await
    }

    async fn open_change_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<ChangeRequestRef, VcsError> {
        self.record(VcsCall::OpenChangeRequest {
            branch: branch.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        })
        .await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ChangeRequestRef {
            id: id.to_string(),
            url: format!("mock://change-requests/{id}"),
        })
    }
}
