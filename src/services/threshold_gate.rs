//! Proposal trigger thresholds.
//!
//! Pure decision over session totals: a session is worth proposing once it
//! touches enough files, changes enough lines, or has been open long
//! enough.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{Session, ThresholdConfig};

/// Why the gate did or did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdReason {
    MinFiles { files: usize, min_files: usize },
    MinLines { lines: u64, min_lines: u64 },
    MaxWait { elapsed_seconds: i64, max_wait_seconds: u64 },
    BelowThresholds,
}

impl std::fmt::Display for ThresholdReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinFiles { files, min_files } => {
                write!(f, "{files} files changed (min_files={min_files})")
            }
            Self::MinLines { lines, min_lines } => {
                write!(f, "{lines} lines changed (min_lines={min_lines})")
            }
            Self::MaxWait { elapsed_seconds, max_wait_seconds } => {
                write!(f, "session open {elapsed_seconds}s (max_wait_seconds={max_wait_seconds})")
            }
            Self::BelowThresholds => write!(f, "below all thresholds"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdDecision {
    pub should_create: bool,
    pub reason: ThresholdReason,
}

#[derive(Debug, Clone)]
pub struct ThresholdGate {
    config: ThresholdConfig,
}

impl ThresholdGate {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Evaluate `session` as of `now`. Rules are checked in the order
    /// files, lines, age; the first that holds is reported.
    pub fn should_create(&self, session: &Session, now: DateTime<Utc>) -> ThresholdDecision {
        let files = session.total_files();
        if files >= self.config.min_files {
            return ThresholdDecision {
                should_create: true,
                reason: ThresholdReason::MinFiles { files, min_files: self.config.min_files },
            };
        }

        let lines = session.total_lines();
        if lines >= self.config.min_lines {
            return ThresholdDecision {
                should_create: true,
                reason: ThresholdReason::MinLines { lines, min_lines: self.config.min_lines },
            };
        }

        let elapsed_seconds = (now - session.start_time).num_seconds();
        let max_wait = i64::try_from(self.config.max_wait_seconds).unwrap_or(i64::MAX);
        if elapsed_seconds >= max_wait {
            return ThresholdDecision {
                should_create: true,
                reason: ThresholdReason::MaxWait {
                    elapsed_seconds,
                    max_wait_seconds: self.config.max_wait_seconds,
                },
            };
        }

        ThresholdDecision {
            should_create: false,
            reason: ThresholdReason::BelowThresholds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;
    use chrono::Duration;

    fn gate() -> ThresholdGate {
        ThresholdGate::new(ThresholdConfig {
            min_files: 3,
            min_lines: 50,
            max_wait_seconds: 300,
        })
    }

    fn session_with(files: &[&str], lines: u64, start: DateTime<Utc>) -> Session {
        let files: Vec<String> = files.iter().map(|f| (*f).to_string()).collect();
        Session::start("s1", Task::new("edit_code", files, 1.0, start).with_lines(lines))
    }

    #[test]
    fn test_small_young_session_waits_then_max_wait_fires() {
        let start = Utc::now();
        let session = session_with(&["a.rs", "b.rs"], 40, start);

        let early = gate().should_create(&session, start + Duration::seconds(100));
        assert!(!early.should_create);
        assert_eq!(early.reason, ThresholdReason::BelowThresholds);

        let late = gate().should_create(&session, start + Duration::seconds(300));
        assert!(late.should_create);
        assert!(matches!(late.reason, ThresholdReason::MaxWait { elapsed_seconds: 300, .. }));
        assert!(late.reason.to_string().contains("max_wait"));
    }

    #[test]
    fn test_file_and_line_thresholds() {
        let start = Utc::now();
        let by_files = gate().should_create(&session_with(&["a", "b", "c"], 0, start), start);
        assert!(matches!(by_files.reason, ThresholdReason::MinFiles { files: 3, .. }));

        let by_lines = gate().should_create(&session_with(&["a"], 50, start), start);
        assert!(matches!(by_lines.reason, ThresholdReason::MinLines { lines: 50, .. }));
    }
}
