//! Line-pattern violation detector.
//!
//! The concrete rule catalog lives outside this crate. `RegexDetector` is
//! the generic building block for it: a named set of line rules, each a
//! regex with a rule id, severity, message and penalty, optionally limited
//! to paths with given extensions.

use std::path::Path;

use regex::Regex;

use crate::domain::models::{Finding, Severity};
use crate::domain::ports::{DetectorError, ViolationDetector};

#[derive(Debug, Clone)]
pub struct RegexRule {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub penalty: f64,
    pattern: Regex,
    extensions: Vec<String>,
}

impl RegexRule {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        penalty: f64,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            penalty,
            pattern: Regex::new(pattern)?,
            extensions: Vec::new(),
        })
    }

    /// Only apply the rule to files with one of these extensions.
    pub fn for_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.trim_start_matches('.').to_string()).collect();
        self
    }

    fn applies_to(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

/// A detector made of independent line rules.
#[derive(Debug, Clone)]
pub struct RegexDetector {
    name: String,
    rules: Vec<RegexRule>,
}

impl RegexDetector {
    pub fn new(name: impl Into<String>, rules: Vec<RegexRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Hardcoded credentials and private keys.
    pub fn secrets() -> Result<Self, regex::Error> {
        Ok(Self::new(
            "secrets",
            vec![
                RegexRule::new(
                    "SEC-001",
                    Severity::Critical,
                    "private key material committed",
                    5.0,
                    r"-----BEGIN (?:RSA |EC |OPENSSH )?PRIVATE KEY-----",
                )?,
                RegexRule::new(
                    "SEC-002",
                    Severity::Warning,
                    "credential assigned from a string literal",
                    2.0,
                    r#"(?i)(?:api_key|apikey|secret|password|token)\s*[:=]\s*["'][^"']{8,}["']"#,
                )?,
            ],
        ))
    }

    /// Leftover debugging and unfinished-work markers.
    pub fn hygiene() -> Result<Self, regex::Error> {
        Ok(Self::new(
            "hygiene",
            vec![
                RegexRule::new("HYG-001", Severity::Info, "debug print left in code", 0.25, r"\bdbg!\(")?
                    .for_extensions(&["rs"]),
                RegexRule::new("HYG-002", Severity::Info, "debugger statement left in code", 0.25, r"\bdebugger;")?
                    .for_extensions(&["js", "ts", "jsx", "tsx"]),
                RegexRule::new("HYG-003", Severity::Warning, "merge conflict marker", 1.5, r"^(?:<{7}|>{7})(?:\s|$)")?,
            ],
        ))
    }
}

impl ViolationDetector for RegexDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, path: &Path, content: &str) -> Result<Vec<Finding>, DetectorError> {
        let rules: Vec<&RegexRule> = self.rules.iter().filter(|r| r.applies_to(path)).collect();
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for (index, line) in content.lines().enumerate() {
            for rule in &rules {
                if rule.pattern.is_match(line) {
                    let line_no = u32::try_from(index + 1)
                        .map_err(|_| DetectorError::failed(&self.name, path, "file too long to address"))?;
                    findings.push(
                        Finding::new(&rule.rule_id, rule.severity, &rule.message, rule.penalty).at_line(line_no),
                    );
                }
            }
        }
        Ok(findings)
    }
}
