//! Property tests for score stabilization, decisions and session growth.

mod common;

use std::sync::Arc;

use changeward::adapters::InMemoryStore;
use changeward::domain::models::{Severity, ViolationResult, WorkflowConfig};
use changeward::services::{decide, stabilize};
use changeward::{Decision, WorkflowAggregator};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn violation(severity: Severity) -> ViolationResult {
    ViolationResult {
        detector_name: "prop".to_string(),
        severity,
        rule_id: "rule".to_string(),
        message: "generated".to_string(),
        penalty: -1.0,
        file: "a.rs".to_string(),
        line: None,
    }
}

proptest! {
    /// Stabilized scores always land in [0, 10].
    #[test]
    fn prop_stabilize_is_bounded(x in proptest::num::f64::ANY, scale in proptest::num::f64::ANY) {
        let y = stabilize(x, scale);
        prop_assert!((0.0..=10.0).contains(&y));
    }

    /// Larger inputs never stabilize lower.
    #[test]
    fn prop_stabilize_is_monotonic(a in -1e6f64..1e6, b in -1e6f64..1e6, scale in 0.1f64..100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(stabilize(lo, scale) <= stabilize(hi, scale));
    }

    /// Any critical violation or negative raw sum blocks, whatever the score.
    #[test]
    fn prop_blockers_always_block(
        weighted_sum in -100.0f64..100.0,
        stabilized in 0.0f64..=10.0,
        threshold in 0.1f64..=10.0,
        complete in any::<bool>(),
        critical in any::<bool>(),
    ) {
        let violations = if critical { vec![violation(Severity::Critical)] } else { vec![violation(Severity::Warning)] };
        let decision = decide(&violations, weighted_sum, stabilized, threshold, complete);
        if critical || weighted_sum < 0.0 {
            prop_assert_eq!(decision, Decision::AutoBlock);
        } else if stabilized >= threshold && complete {
            prop_assert_eq!(decision, Decision::AutoApprove);
        } else {
            prop_assert_eq!(decision, Decision::ReviewRequired);
        }
    }

    /// A session's file set only grows as overlapping tasks join it.
    #[test]
    fn prop_session_files_only_grow(extra in proptest::collection::vec("[a-e]\\.rs", 1..8)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let agg = WorkflowAggregator::new(Arc::new(InMemoryStore::new()), &WorkflowConfig::default());
            let id = agg.add_task("edit_code", common::files(&["a.rs"]), 1.0, common::t0()).await;
            let mut previous = 1;
            for (i, file) in extra.iter().enumerate() {
                let files = vec!["a.rs".to_string(), file.clone()];
                let joined = agg.add_task("edit_code", files, 1.0, common::at(10 * (i as i64 + 1))).await;
                prop_assert_eq!(&joined, &id);
                let session = agg.get(&id).await.unwrap().unwrap();
                prop_assert!(session.total_files() >= previous);
                prop_assert!(session.files.contains(file));
                previous = session.total_files();
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
