//! Version control port.
//!
//! The proposal creator only needs four operations from a VCS host:
//! cut a branch, commit files onto it, push it, and open a change request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Identifier and URL returned by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestRef {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Hosting API request failed: {0}")]
    Http(String),

    #[error("Unexpected hosting API response: {0}")]
    InvalidResponse(String),

    #[error("VCS adapter misconfigured: {0}")]
    Misconfigured(String),
}

impl From<VcsError> for DomainError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::Misconfigured(msg) => DomainError::ConfigurationError(msg),
            other => DomainError::VcsError(other.to_string()),
        }
    }
}

/// Branch/commit/push/open-change-request operations.
#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// Create (or reset) a branch from the configured base.
    async fn create_branch(&self, name: &str) -> Result<(), VcsError>;

    /// Commit the working-tree state of `files` onto `branch`. Paths that
    /// no longer exist are recorded as deletions.
    async fn commit(&self, branch: &str, files: &[String], message: &str) -> Result<(), VcsError>;

    async fn push(&self, branch: &str) -> Result<(), VcsError>;

    async fn open_change_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<ChangeRequestRef, VcsError>;
}
