//! CLI command implementations.

pub mod cleanup;
pub mod propose;
pub mod run;
pub mod sessions;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::vcs::{GitCliAdapter, MockVcsAdapter};
use crate::adapters::PersistenceBackend;
use crate::application::Orchestrator;
use crate::domain::models::Config;
use crate::domain::ports::VcsAdapter;
use crate::services::ViolationDetectorSet;

/// State shared by every command: validated config and the probed store.
pub struct AppContext {
    pub config: Config,
    pub backend: PersistenceBackend,
}

impl AppContext {
    pub async fn open(config: Config) -> Self {
        let backend = PersistenceBackend::probe(&config.database).await;
        Self { config, backend }
    }

    /// Build an orchestrator over this context and restore active sessions.
    ///
    /// With `dry_run` the VCS adapter only records calls.
    pub async fn orchestrator(&self, dry_run: bool) -> Result<Arc<Orchestrator>> {
        let vcs: Arc<dyn VcsAdapter> = if dry_run {
            Arc::new(MockVcsAdapter::new())
        } else {
            Arc::new(
                GitCliAdapter::from_config(&self.config.vcs)
                    .context("Failed to configure the git adapter")?,
            )
        };
        let detectors =
            ViolationDetectorSet::builtin().context("Failed to compile built-in detectors")?;

        let orchestrator = Arc::new(Orchestrator::new(
            self.config.clone(),
            self.backend.clone(),
            vcs,
            detectors,
        ));
        let restored = orchestrator.start().await;
        tracing::debug!(restored, "restored active sessions");
        Ok(orchestrator)
    }
}
