//! Rule violations produced by detectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// What a single detector reports for one file, before the detector set
/// attributes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub penalty: f64,
    pub line: Option<u32>,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        penalty: f64,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            penalty,
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Reject payloads the scoring engine cannot use.
    pub fn validate(&self) -> Result<(), String> {
        if self.rule_id.trim().is_empty() {
            return Err("rule_id cannot be empty".to_string());
        }
        if !self.penalty.is_finite() {
            return Err(format!("penalty for {} is not finite", self.rule_id));
        }
        Ok(())
    }
}

/// An attributed, immutable violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationResult {
    pub detector_name: String,
    pub severity: Severity,
    pub rule_id: String,
    pub message: String,
    pub penalty: f64,
    pub file: String,
    pub line: Option<u32>,
}

impl ViolationResult {
    pub fn from_finding(detector_name: &str, file: &str, finding: Finding) -> Self {
        Self {
            detector_name: detector_name.to_string(),
            severity: finding.severity,
            rule_id: finding.rule_id,
            message: finding.message,
            penalty: finding.penalty,
            file: file.to_string(),
            line: finding.line,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Counts used by the description generator and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_rule: BTreeMap<String, usize>,
}

impl ViolationSummary {
    pub fn from_violations(violations: &[ViolationResult]) -> Self {
        let mut summary = Self {
            total: violations.len(),
            ..Self::default()
        };
        for v in violations {
            *summary.by_severity.entry(v.severity).or_default() += 1;
            *summary.by_rule.entry(v.rule_id.clone()).or_default() += 1;
        }
        summary
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}
