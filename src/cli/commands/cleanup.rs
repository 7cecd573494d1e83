//! `changeward cleanup`: complete stale sessions.

use anyhow::Result;

use super::AppContext;
use crate::cli::output::{output, CommandOutput};

#[derive(Debug, serde::Serialize)]
pub struct CleanupOutput {
    pub max_age_minutes: u64,
    pub completed: Vec<String>,
}

impl CommandOutput for CleanupOutput {
    fn to_human(&self) -> String {
        if self.completed.is_empty() {
            return format!("No sessions idle for more than {} minutes", self.max_age_minutes);
        }
        let mut lines = vec![format!("Completed {} stale session(s):", self.completed.len())];
        lines.extend(self.completed.iter().map(|id| format!("  - {id}")));
        lines.join("\n")
    }
}

pub async fn execute(ctx: &AppContext, max_age_minutes: Option<u64>, json_mode: bool) -> Result<()> {
    let max_age_minutes = max_age_minutes.unwrap_or(ctx.config.workflow.stale_after_minutes);
    let orchestrator = ctx.orchestrator(true).await?;
    let completed = orchestrator.cleanup(max_age_minutes).await;
    output(&CleanupOutput { max_age_minutes, completed }, json_mode);
    Ok(())
}
