//! Violation detector port.

use std::path::Path;

use thiserror::Error;

use crate::domain::models::Finding;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detector {detector} failed on {path}: {message}")]
    Failed {
        detector: String,
        path: String,
        message: String,
    },
}

impl DetectorError {
    pub fn failed(detector: &str, path: &Path, message: impl Into<String>) -> Self {
        Self::Failed {
            detector: detector.to_string(),
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

/// A pure rule detector: `(path, content) -> findings`.
///
/// Implementations carry no shared mutable state and are never required to
/// agree with other detectors on overlapping line ranges.
pub trait ViolationDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, path: &Path, content: &str) -> Result<Vec<Finding>, DetectorError>;
}
