//! Violation detector dispatch and aggregation.
//!
//! Each registered detector runs independently on each file. A detector
//! that errors or panics is logged and excluded for that file; the other
//! detectors' results are still aggregated. Findings that fail validation
//! are skipped one by one.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::RegexDetector;
use crate::domain::models::{Severity, ViolationResult, ViolationSummary};
use crate::domain::ports::ViolationDetector;

/// A file handed to the detectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A detector that could not produce results for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorFailure {
    pub detector: String,
    pub file: String,
    pub message: String,
}

/// Aggregated output of one `detect_all` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    pub violations: Vec<ViolationResult>,
    pub by_detector: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub failures: Vec<DetectorFailure>,
    /// Findings dropped because they failed validation.
    pub skipped: usize,
}

impl DetectionReport {
    pub fn summary(&self) -> ViolationSummary {
        ViolationSummary::from_violations(&self.violations)
    }

    pub fn has_critical(&self) -> bool {
        self.violations.iter().any(ViolationResult::is_critical)
    }

    fn push(&mut self, violation: ViolationResult) {
        *self.by_detector.entry(violation.detector_name.clone()).or_default() += 1;
        *self.by_severity.entry(violation.severity).or_default() += 1;
        self.violations.push(violation);
    }
}

#[derive(Clone, Default)]
pub struct ViolationDetectorSet {
    detectors: Vec<Arc<dyn ViolationDetector>>,
}

impl ViolationDetectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generic detectors that ship with the crate.
    pub fn builtin() -> Result<Self, regex::Error> {
        Ok(Self::new()
            .with_detector(Arc::new(RegexDetector::secrets()?))
            .with_detector(Arc::new(RegexDetector::hygiene()?)))
    }

    pub fn with_detector(mut self, detector: Arc<dyn ViolationDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn detect_all(&self, files: &[SourceFile]) -> DetectionReport {
        let mut report = DetectionReport::default();

        for file in files {
            let path = Path::new(&file.path);
            for detector in &self.detectors {
                let name = detector.name();
                let outcome = catch_unwind(AssertUnwindSafe(|| detector.detect(path, &file.content)));

                let findings = match outcome {
                    Ok(Ok(findings)) => findings,
                    Ok(Err(e)) => {
                        warn!(detector = name, file = %file.path, error = %e, "detector failed; excluding its results");
                        report.failures.push(DetectorFailure {
                            detector: name.to_string(),
                            file: file.path.clone(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(detector = name, file = %file.path, %message, "detector panicked; excluding its results");
                        report.failures.push(DetectorFailure {
                            detector: name.to_string(),
                            file: file.path.clone(),
                            message,
                        });
                        continue;
                    }
                };

                for finding in findings {
                    if let Err(reason) = finding.validate() {
                        warn!(detector = name, file = %file.path, %reason, "skipping invalid finding");
                        report.skipped += 1;
                        continue;
                    }
                    report.push(ViolationResult::from_finding(name, &file.path, finding));
                }
            }
        }

        debug!(
            files = files.len(),
            violations = report.violations.len(),
            failures = report.failures.len(),
            "detection complete"
        );
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "detector panicked".to_string()
    }
}
