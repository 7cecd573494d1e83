//! `changeward run`: feed stdin events through the pipeline.

use std::io::BufRead;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::AppContext;
use crate::application::RunSummary;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::FileChangeEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub events_read: usize,
    pub events_rejected: usize,
    pub batches: usize,
    pub proposals_created: usize,
    pub proposals_replayed: usize,
    pub proposals_failed: usize,
    pub stale_completed: usize,
}

impl RunOutput {
    fn new(read: LineCounts, summary: RunSummary) -> Self {
        Self {
            events_read: read.accepted,
            events_rejected: read.rejected,
            batches: summary.batches,
            proposals_created: summary.proposals_created,
            proposals_replayed: summary.proposals_replayed,
            proposals_failed: summary.proposals_failed,
            stale_completed: summary.stale_completed,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Run finished:".to_string()];
        lines.push(format!("  Events read:        {}", self.events_read));
        if self.events_rejected > 0 {
            lines.push(format!("  Events rejected:    {}", self.events_rejected));
        }
        lines.push(format!("  Batches:            {}", self.batches));
        lines.push(format!("  Proposals created:  {}", self.proposals_created));
        lines.push(format!("  Proposals replayed: {}", self.proposals_replayed));
        lines.push(format!("  Proposals failed:   {}", self.proposals_failed));
        lines.push(format!("  Stale sessions:     {}", self.stale_completed));
        lines.join("\n")
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LineCounts {
    accepted: usize,
    rejected: usize,
}

/// Parse one JSON-lines record. Blank lines yield `None`.
pub fn parse_event_line(line: &str) -> Option<Result<FileChangeEvent, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Blocking stdin reader; only ever sends into the channel.
fn read_events<R: BufRead>(reader: R, tx: &mpsc::Sender<FileChangeEvent>) -> LineCounts {
    let mut counts = LineCounts::default();
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin read failed; stopping");
                break;
            }
        };
        match parse_event_line(&line) {
            None => {}
            Some(Ok(event)) => {
                counts.accepted += 1;
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                counts.rejected += 1;
                warn!(line = index + 1, error = %e, "skipping malformed event");
            }
        }
    }
    counts
}

pub async fn execute(ctx: &AppContext, dry_run: bool, json_mode: bool) -> Result<()> {
    let orchestrator = ctx.orchestrator(dry_run).await?;
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let reader = tokio::task::spawn_blocking(move || read_events(std::io::stdin().lock(), &tx));
    info!(dry_run, "reading change events from stdin");

    let summary = orchestrator.run(rx).await;
    let counts = reader.await.context("stdin reader task failed")?;

    output(&RunOutput::new(counts, summary), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChangeType;

    #[test]
    fn test_parse_event_line() {
        let line = r#"{"path":"src/a.rs","change_type":"modified","timestamp":"2024-05-01T09:00:00Z","lines_added":3}"#;
        let event = parse_event_line(line).unwrap().unwrap();
        assert_eq!(event.path, "src/a.rs");
        assert_eq!(event.change_type, ChangeType::Modified);
        assert_eq!(event.lines_changed(), 3);

        assert!(parse_event_line("   ").is_none());
        assert!(parse_event_line("{not json").unwrap().is_err());
    }

    #[tokio::test]
    async fn test_read_events_skips_malformed_lines() {
        let input = concat!(
            r#"{"path":"a.rs","change_type":"added","timestamp":"2024-05-01T09:00:00Z"}"#,
            "\n\ngarbage\n",
            r#"{"path":"b.rs","change_type":"removed","timestamp":"2024-05-01T09:00:01Z"}"#,
            "\n"
        );
        let (tx, mut rx) = mpsc::channel(8);
        let counts = tokio::task::spawn_blocking(move || read_events(input.as_bytes(), &tx))
            .await
            .unwrap();

        assert_eq!(counts.accepted, 2);
        assert_eq!(counts.rejected, 1);
        assert_eq!(rx.recv().await.unwrap().path, "a.rs");
        assert_eq!(rx.recv().await.unwrap().path, "b.rs");
        assert!(rx.recv().await.is_none());
    }
}
