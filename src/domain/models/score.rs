//! Scoring results and the approval decision taxonomy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::violation::ViolationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApprove,
    AutoBlock,
    ReviewRequired,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "auto_approve",
            Self::AutoBlock => "auto_block",
            Self::ReviewRequired => "review_required",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto_approve" => Some(Self::AutoApprove),
            "auto_block" => Some(Self::AutoBlock),
            "review_required" => Some(Self::ReviewRequired),
            _ => None,
        }
    }
}

/// A named, weighted category contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCategory {
    pub name: String,
    pub raw_score: f64,
    pub weight: f64,
}

impl ScoreCategory {
    pub fn weighted(&self) -> f64 {
        self.raw_score * self.weight
    }
}

/// Outcome of one scoring invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrScoreResult {
    pub identifier: String,
    pub category_scores: BTreeMap<String, f64>,
    pub violations: Vec<ViolationResult>,
    pub pipeline_complete: bool,
    /// Bonus actually applied (zero when the pipeline is incomplete).
    pub pipeline_bonus: f64,
    /// Pre-stabilization sum; the negative-score block checks this value.
    pub weighted_sum: f64,
    pub stabilized_score: f64,
    pub approve_threshold: f64,
    pub decision: Decision,
    pub scored_at: DateTime<Utc>,
}
