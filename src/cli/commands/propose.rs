//! `changeward propose`: manual trigger for one session.

use anyhow::Result;

use super::AppContext;
use crate::application::ProposalReport;
use crate::cli::output::{output, CommandOutput};

#[derive(Debug, serde::Serialize)]
pub struct ProposeOutput {
    pub session_id: String,
    pub proposal_id: String,
    pub url: String,
    pub replayed: bool,
    pub score: Option<f64>,
    pub decision: Option<String>,
    pub violations: usize,
}

impl From<ProposalReport> for ProposeOutput {
    fn from(report: ProposalReport) -> Self {
        Self {
            session_id: report.session_id,
            proposal_id: report.proposal.id,
            url: report.proposal.url,
            replayed: report.replayed,
            score: report.score.as_ref().map(|s| s.stabilized_score),
            decision: report.score.as_ref().map(|s| s.decision.as_str().to_string()),
            violations: report.score.as_ref().map_or(0, |s| s.violations.len()),
        }
    }
}

impl CommandOutput for ProposeOutput {
    fn to_human(&self) -> String {
        let verb = if self.replayed { "Existing" } else { "Created" };
        let mut lines = vec![format!("{verb} change request for session {}", self.session_id)];
        lines.push(format!("  URL:        {}", self.url));
        match (&self.score, &self.decision) {
            (Some(score), Some(decision)) => {
                lines.push(format!("  Score:      {score:.2}"));
                lines.push(format!("  Decision:   {decision}"));
                lines.push(format!("  Violations: {}", self.violations));
            }
            _ => lines.push("  Score:      (not recorded)".to_string()),
        }
        lines.join("\n")
    }
}

pub async fn execute(
    ctx: &AppContext,
    session_id: &str,
    force: bool,
    dry_run: bool,
    json_mode: bool,
) -> Result<()> {
    let orchestrator = ctx.orchestrator(dry_run).await?;
    let report = orchestrator.propose(session_id, force).await?;
    output(&ProposeOutput::from(report), json_mode);
    Ok(())
}
