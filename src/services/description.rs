//! Change request descriptions.
//!
//! Every description embeds a five-part compliance narrative. The same
//! module parses it back, so the scoring engine's completeness check and
//! the generator cannot drift apart.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::domain::models::{Session, SessionChange, Severity, ViolationSummary};

/// Narrative sections, in order.
pub const PIPELINE_STEPS: [&str; 5] = [
    "Discovery",
    "Pattern Analysis",
    "Rule Compliance Checklist",
    "Implementation Plan",
    "Post-Implementation Audit",
];

/// Inputs to a description. Output is a pure function of these.
#[derive(Debug, Clone, Copy)]
pub struct DescriptionInput<'a> {
    pub session: &'a Session,
    pub changes: &'a [SessionChange],
    pub violations: Option<&'a ViolationSummary>,
}

pub fn title_for(session: &Session) -> String {
    format!(
        "{}: {} file{} ({})",
        session.tasks.first().map_or("change", |t| t.task_type.as_str()),
        session.total_files(),
        if session.total_files() == 1 { "" } else { "s" },
        session.id
    )
}

pub fn commit_message(session: &Session) -> String {
    format!("{}\n\nSession {} with {} task(s).", title_for(session), session.id, session.tasks.len())
}

pub fn generate(input: &DescriptionInput<'_>) -> String {
    let sections = [
        discovery(input),
        pattern_analysis(input),
        compliance_checklist(input),
        implementation_plan(input),
        audit(input),
    ];

    let mut out = format!("## Summary\n\n{}\n\n## Compliance Pipeline\n", title_for(input.session));
    for (index, (heading, body)) in PIPELINE_STEPS.iter().zip(sections).enumerate() {
        let _ = write!(out, "\n### {}. {}\n\n{}\n", index + 1, heading, body.trim_end());
    }
    out
}

/// Latest change type per path, sorted by path.
fn latest_changes<'a>(input: &DescriptionInput<'a>) -> BTreeMap<&'a str, &'a str> {
    let mut latest = BTreeMap::new();
    for change in input.changes {
        latest.insert(change.event.path.as_str(), change.event.change_type.as_str());
    }
    for file in &input.session.files {
        latest.entry(file.as_str()).or_insert("modified");
    }
    latest
}

fn discovery(input: &DescriptionInput<'_>) -> String {
    let added: u64 = input.changes.iter().map(|c| u64::from(c.event.lines_added)).sum();
    let removed: u64 = input.changes.iter().map(|c| u64::from(c.event.lines_removed)).sum();
    let mut out = format!(
        "{} file(s) touched over {} task(s), +{added}/-{removed} lines since {}.\n\n",
        input.session.total_files(),
        input.session.tasks.len(),
        input.session.start_time.to_rfc3339(),
    );
    for (path, kind) in latest_changes(input) {
        let _ = writeln!(out, "- `{path}` ({kind})");
    }
    out
}

fn pattern_analysis(input: &DescriptionInput<'_>) -> String {
    let mut by_area: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_extension: BTreeMap<&str, usize> = BTreeMap::new();
    for path in &input.session.files {
        let area = path.split('/').next().filter(|_| path.contains('/')).unwrap_or(".");
        *by_area.entry(area).or_default() += 1;
        let ext = path.rsplit_once('.').map_or("(none)", |(_, e)| e);
        *by_extension.entry(ext).or_default() += 1;
    }

    let mut out = String::from("Areas:\n");
    for (area, count) in &by_area {
        let _ = writeln!(out, "- {area}: {count}");
    }
    out.push_str("\nFile types:\n");
    for (ext, count) in &by_extension {
        let _ = writeln!(out, "- {ext}: {count}");
    }
    out
}

fn compliance_checklist(input: &DescriptionInput<'_>) -> String {
    let Some(summary) = input.violations else {
        return "- [ ] Violation scan not available for this change set\n".to_string();
    };
    let check = |ok: bool| if ok { "x" } else { " " };
    let critical = summary.count(Severity::Critical);
    let warnings = summary.count(Severity::Warning);
    let info = summary.count(Severity::Info);

    let mut out = String::new();
    let _ = writeln!(out, "- [{}] No critical violations ({critical} found)", check(critical == 0));
    let _ = writeln!(out, "- [{}] No warnings ({warnings} found)", check(warnings == 0));
    let _ = writeln!(out, "- [{}] No informational findings ({info} found)", check(info == 0));
    for (rule, count) in &summary.by_rule {
        let _ = writeln!(out, "  - {rule}: {count}");
    }
    out
}

fn implementation_plan(input: &DescriptionInput<'_>) -> String {
    let mut out = String::new();
    for (index, task) in input.session.tasks.iter().enumerate() {
        let files: BTreeSet<&str> = task.files.iter().map(String::as_str).collect();
        let _ = writeln!(
            out,
            "{}. {} at {} ({} file(s), {} line(s), confidence {:.2})",
            index + 1,
            task.task_type,
            task.timestamp.to_rfc3339(),
            files.len(),
            task.lines_changed,
            task.confidence,
        );
    }
    if out.is_empty() {
        out.push_str("No recorded tasks.\n");
    }
    out
}

fn audit(input: &DescriptionInput<'_>) -> String {
    let touches = |needle: &str| input.session.files.iter().any(|f| f.contains(needle));
    let tests = touches("test") || touches("spec");
    let docs = input.session.files.iter().any(|f| f.ends_with(".md") || f.starts_with("docs/"));
    let findings = input.violations.map_or(0, |s| s.total);

    let mut out = String::new();
    let _ = writeln!(out, "- Tests updated: {}", if tests { "yes" } else { "no" });
    let _ = writeln!(out, "- Documentation updated: {}", if docs { "yes" } else { "no" });
    let _ = writeln!(out, "- Lines changed: {}", input.session.total_lines());
    let _ = writeln!(out, "- Findings to review: {findings}");
    out
}

fn normalize_heading(line: &str) -> Option<String> {
    let text = line.trim_start().strip_prefix('#')?.trim_start_matches('#').trim();
    let text = text.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start_matches('.').trim();
    Some(text.to_lowercase().replace('-', " "))
}

/// Whether every narrative section is present with a non-empty body.
pub fn pipeline_complete(description: &str) -> bool {
    let wanted: Vec<String> = PIPELINE_STEPS.iter().map(|s| s.to_lowercase().replace('-', " ")).collect();
    let mut bodies: Vec<bool> = vec![false; wanted.len()];
    let mut seen: Vec<bool> = vec![false; wanted.len()];
    let mut current: Option<usize> = None;

    for line in description.lines() {
        if let Some(heading) = normalize_heading(line) {
            current = wanted.iter().position(|w| *w == heading);
            if let Some(index) = current {
                seen[index] = true;
            }
            continue;
        }
        if let Some(index) = current {
            if !line.trim().is_empty() {
                bodies[index] = true;
            }
        }
    }

    seen.iter().zip(&bodies).all(|(s, b)| *s && *b)
}
