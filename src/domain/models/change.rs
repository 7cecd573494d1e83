//! File change events and the batches the change buffer hands downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change the filesystem observer saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "added" | "created" => Some(Self::Added),
            "modified" => Some(Self::Modified),
            "removed" | "deleted" => Some(Self::Removed),
            "renamed" | "moved" => Some(Self::Renamed),
            _ => None,
        }
    }
}

/// A single observed change. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub path: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub lines_added: u32,
    #[serde(default)]
    pub lines_removed: u32,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<String>, change_type: ChangeType, timestamp: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            change_type,
            timestamp,
            lines_added: 0,
            lines_removed: 0,
        }
    }

    pub fn with_lines(mut self, added: u32, removed: u32) -> Self {
        self.lines_added = added;
        self.lines_removed = removed;
        self
    }

    pub fn lines_changed(&self) -> u64 {
        u64::from(self.lines_added) + u64::from(self.lines_removed)
    }
}

/// Why the change buffer flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    /// No new event arrived within the debounce window.
    Idle,
    /// The first buffered event is older than the absolute max wait.
    MaxWait,
    /// The buffer reached its configured batch size.
    BatchFull,
    /// The event source closed; whatever remained was flushed.
    Shutdown,
}

/// A drained set of events, in arrival order.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub events: Vec<FileChangeEvent>,
    pub reason: FlushReason,
}

impl ChangeBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Unique paths touched by the batch, in first-seen order.
    pub fn paths(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.events
            .iter()
            .filter(|e| seen.insert(e.path.as_str()))
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn lines_changed(&self) -> u64 {
        self.events.iter().map(FileChangeEvent::lines_changed).sum()
    }

    /// Timestamp of the newest event in the batch.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.iter().map(|e| e.timestamp).max()
    }
}

/// A change attributed to a session and stored until a proposal consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChange {
    pub id: i64,
    pub session_id: String,
    pub event: FileChangeEvent,
    pub processed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_round_trip_names() {
        for ct in [ChangeType::Added, ChangeType::Modified, ChangeType::Removed, ChangeType::Renamed] {
            assert_eq!(ChangeType::from_str(ct.as_str()), Some(ct));
        }
        assert_eq!(ChangeType::from_str("deleted"), Some(ChangeType::Removed));
        assert_eq!(ChangeType::from_str("touched"), None);
    }

    #[test]
    fn test_batch_paths_are_unique_in_order() {
        let now = Utc::now();
        let batch = ChangeBatch {
            events: vec![
                FileChangeEvent::new("b.rs", ChangeType::Modified, now).with_lines(3, 1),
                FileChangeEvent::new("a.rs", ChangeType::Added, now).with_lines(10, 0),
                FileChangeEvent::new("b.rs", ChangeType::Modified, now).with_lines(2, 2),
            ],
            reason: FlushReason::Idle,
        };
        assert_eq!(batch.paths(), vec!["b.rs".to_string(), "a.rs".to_string()]);
        assert_eq!(batch.lines_changed(), 18);
    }

    #[test]
    fn test_event_deserializes_without_line_counts() {
        let json = r#"{"path":"src/lib.rs","change_type":"modified","timestamp":"2024-01-01T00:00:00Z"}"#;
        let event: FileChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.lines_changed(), 0);
        assert_eq!(event.change_type, ChangeType::Modified);
    }
}
