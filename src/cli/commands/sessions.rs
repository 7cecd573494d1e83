//! `changeward sessions`: list stored sessions.

use anyhow::Result;
use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};

use super::AppContext;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::Session;

#[derive(Debug, serde::Serialize)]
pub struct SessionRow {
    pub id: String,
    pub status: String,
    pub tasks: usize,
    pub files: usize,
    pub lines: u64,
    pub last_task: Option<String>,
    pub last_activity: String,
    pub proposal_url: Option<String>,
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            status: session.status.as_str().to_string(),
            tasks: session.tasks.len(),
            files: session.total_files(),
            lines: session.total_lines(),
            last_task: session.last_task_type().map(str::to_string),
            last_activity: session.last_activity.to_rfc3339(),
            proposal_url: session.proposal.as_ref().map(|p| p.url.clone()),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct SessionsOutput {
    pub sessions: Vec<SessionRow>,
}

impl CommandOutput for SessionsOutput {
    fn to_human(&self) -> String {
        if self.sessions.is_empty() {
            return "No sessions".to_string();
        }
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("ID").add_attribute(Attribute::Bold),
                Cell::new("Status").add_attribute(Attribute::Bold),
                Cell::new("Tasks").add_attribute(Attribute::Bold),
                Cell::new("Files").add_attribute(Attribute::Bold),
                Cell::new("Lines").add_attribute(Attribute::Bold),
                Cell::new("Last task").add_attribute(Attribute::Bold),
                Cell::new("Last activity").add_attribute(Attribute::Bold),
                Cell::new("Proposal").add_attribute(Attribute::Bold),
            ]);
        for row in &self.sessions {
            table.add_row(vec![
                Cell::new(&row.id),
                Cell::new(&row.status),
                Cell::new(row.tasks),
                Cell::new(row.files),
                Cell::new(row.lines),
                Cell::new(row.last_task.as_deref().unwrap_or("-")),
                Cell::new(&row.last_activity),
                Cell::new(row.proposal_url.as_deref().map_or_else(|| "-".to_string(), |u| truncate(u, 48))),
            ]);
        }
        table.to_string()
    }
}

pub async fn execute(ctx: &AppContext, include_completed: bool, json_mode: bool) -> Result<()> {
    let orchestrator = ctx.orchestrator(true).await?;
    let sessions = orchestrator.list_sessions(include_completed).await?;
    let out = SessionsOutput {
        sessions: sessions.iter().map(SessionRow::from).collect(),
    };
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;
    use chrono::Utc;

    #[test]
    fn test_table_lists_each_session() {
        let task = Task::new("edit_code", vec!["src/a.rs".into(), "src/b.rs".into()], 1.0, Utc::now())
            .with_lines(12);
        let session = Session::start("abc123", task);
        let out = SessionsOutput {
            sessions: vec![SessionRow::from(&session)],
        };

        let rendered = out.to_human();
        assert!(rendered.contains("abc123"));
        assert!(rendered.contains("edit_code"));
        assert_eq!(out.sessions[0].files, 2);
        assert_eq!(out.sessions[0].lines, 12);
    }
}
