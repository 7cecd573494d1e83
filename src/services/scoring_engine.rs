//! Hybrid change scoring.
//!
//! A change request is scored by summing weighted category scores, taking
//! off violation penalties, adding the pipeline bonus when the compliance
//! narrative is complete, and squashing the sum into `[0, 10]`. The
//! decision looks at the raw sum for the negative-score block, never at
//! the squashed value, which cannot go below zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::description::pipeline_complete;
use super::task_classifier::{is_code_path, is_test_path};
use crate::domain::models::{Decision, PrScoreResult, ScoreCategory, ScoringConfig, ViolationResult};
use crate::domain::ports::ScoreRepository;

/// Score of a neutral change.
pub const NEUTRAL_SCORE: f64 = 5.0;
pub const MAX_SCORE: f64 = 10.0;
const DEFAULT_SCALE: f64 = 4.0;

/// Heuristic that rates one aspect of a change set.
pub trait CategoryAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Weight used when the configuration names no weight for this category.
    fn default_weight(&self) -> f64 {
        1.0
    }

    fn analyze(&self, changed_files: &[String], description: &str) -> f64;
}

/// Rewards small, reviewable change sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeSizeAnalyzer;

impl CategoryAnalyzer for ChangeSizeAnalyzer {
    fn name(&self) -> &str {
        "change_size"
    }

    fn analyze(&self, changed_files: &[String], _description: &str) -> f64 {
        match changed_files.len() {
            0 => 0.0,
            1..=5 => 2.0,
            6..=15 => 1.0,
            16..=30 => 0.0,
            _ => -2.0,
        }
    }
}

/// Rewards code changes that come with test changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestCoverageAnalyzer;

impl CategoryAnalyzer for TestCoverageAnalyzer {
    fn name(&self) -> &str {
        "test_coverage"
    }

    fn analyze(&self, changed_files: &[String], _description: &str) -> f64 {
        let tests = changed_files.iter().any(|f| is_test_path(f));
        let code = changed_files.iter().any(|f| is_code_path(f));
        match (code, tests) {
            (_, true) => 2.0,
            (true, false) => -1.0,
            (false, false) => 0.5,
        }
    }
}

/// Logistic squash into `[0, 10]`, centered on 5 at `x = 0`.
///
/// Non-positive or non-finite scales fall back to the default; NaN maps to
/// the neutral score.
pub fn stabilize(x: f64, scale: f64) -> f64 {
    if x.is_nan() {
        return NEUTRAL_SCORE;
    }
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { DEFAULT_SCALE };
    (MAX_SCORE / (1.0 + (-x / scale).exp())).clamp(0.0, MAX_SCORE)
}

/// Decision rules, first match wins.
pub fn decide(
    violations: &[ViolationResult],
    weighted_sum: f64,
    stabilized_score: f64,
    approve_threshold: f64,
    pipeline_complete: bool,
) -> Decision {
    if violations.iter().any(ViolationResult::is_critical) || weighted_sum < 0.0 {
        Decision::AutoBlock
    } else if stabilized_score >= approve_threshold && pipeline_complete {
        Decision::AutoApprove
    } else {
        Decision::ReviewRequired
    }
}

pub struct ScoringEngine {
    analyzers: Vec<Arc<dyn CategoryAnalyzer>>,
    config: ScoringConfig,
    repo: Arc<dyn ScoreRepository>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, repo: Arc<dyn ScoreRepository>) -> Self {
        Self {
            analyzers: vec![Arc::new(ChangeSizeAnalyzer), Arc::new(TestCoverageAnalyzer)],
            config,
            repo,
        }
    }

    pub fn with_analyzers(mut self, analyzers: Vec<Arc<dyn CategoryAnalyzer>>) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Run every analyzer over the change set.
    pub fn categorize(&self, changed_files: &[String], description: &str) -> Vec<ScoreCategory> {
        self.analyzers
            .iter()
            .map(|analyzer| {
                let name = analyzer.name().to_string();
                let mut raw_score = analyzer.analyze(changed_files, description);
                if !raw_score.is_finite() {
                    warn!(category = %name, raw_score, "non-finite category score treated as 0");
                    raw_score = 0.0;
                }
                let weight = self
                    .config
                    .weight_for(&name)
                    .unwrap_or_else(|| analyzer.default_weight());
                ScoreCategory { name, raw_score, weight }
            })
            .collect()
    }

    #[instrument(skip(self, changed_files, description, violations), fields(files = changed_files.len()))]
    pub async fn score(
        &self,
        identifier: &str,
        changed_files: &[String],
        description: &str,
        violations: Vec<ViolationResult>,
    ) -> PrScoreResult {
        let categories = self.categorize(changed_files, description);
        self.score_categories(identifier, &categories, description, violations)
            .await
    }

    /// Score precomputed categories, then persist the result. A persistence
    /// failure is logged and the result is still returned.
    pub async fn score_categories(
        &self,
        identifier: &str,
        categories: &[ScoreCategory],
        description: &str,
        violations: Vec<ViolationResult>,
    ) -> PrScoreResult {
        let result = self.evaluate(identifier, categories, description, violations);

        info!(
            identifier,
            weighted_sum = result.weighted_sum,
            stabilized_score = result.stabilized_score,
            decision = result.decision.as_str(),
            "change scored"
        );

        if let Err(e) = self.repo.insert(&result).await {
            warn!(identifier, error = %e, "failed to persist score; returning it anyway");
        }
        result
    }

    fn evaluate(
        &self,
        identifier: &str,
        categories: &[ScoreCategory],
        description: &str,
        violations: Vec<ViolationResult>,
    ) -> PrScoreResult {
        let mut category_scores = BTreeMap::new();
        let mut weighted_sum = 0.0;
        for category in categories {
            let raw = if category.raw_score.is_finite() { category.raw_score } else { 0.0 };
            category_scores.insert(category.name.clone(), raw);
            weighted_sum += raw * category.weight;
        }

        weighted_sum -= violations.iter().map(|v| v.penalty).sum::<f64>();

        let complete = pipeline_complete(description);
        let pipeline_bonus = if complete { self.config.pipeline_bonus } else { 0.0 };
        weighted_sum += pipeline_bonus;

        let stabilized_score = stabilize(weighted_sum, self.config.stabilization_scale);
        let decision = decide(
            &violations,
            weighted_sum,
            stabilized_score,
            self.config.approve_threshold,
            complete,
        );

        PrScoreResult {
            identifier: identifier.to_string(),
            category_scores,
            violations,
            pipeline_complete: complete,
            pipeline_bonus,
            weighted_sum,
            stabilized_score,
            approve_threshold: self.config.approve_threshold,
            decision,
            scored_at: Utc::now(),
        }
    }
}
