//! Path-based task classification for flushed change batches.

use std::path::Path;

use crate::domain::models::{ChangeBatch, ChangeType};

pub const EDIT_CODE: &str = "edit_code";
pub const WRITE_TESTS: &str = "write_tests";
pub const WRITE_DOCS: &str = "write_docs";
pub const CONFIGURE: &str = "configure";
pub const REFACTOR: &str = "refactor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathClass {
    Test,
    Docs,
    Config,
    Code,
}

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "adoc", "txt"];
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json", "ini", "cfg", "conf", "env", "lock"];

fn classify_path(path: &str) -> PathClass {
    let p = Path::new(path);
    let in_dir = |names: &[&str]| {
        p.parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| c.as_os_str().to_str())
            .any(|c| names.contains(&c))
    };
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let ext = p.extension().and_then(|s| s.to_str()).unwrap_or_default();

    if in_dir(&["tests", "test", "__tests__", "spec"])
        || stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
        || stem.ends_with(".test")
        || stem.ends_with(".spec")
    {
        PathClass::Test
    } else if DOC_EXTENSIONS.contains(&ext) || in_dir(&["docs", "doc"]) {
        PathClass::Docs
    } else if CONFIG_EXTENSIONS.contains(&ext) {
        PathClass::Config
    } else {
        PathClass::Code
    }
}

pub fn is_test_path(path: &str) -> bool {
    classify_path(path) == PathClass::Test
}

pub fn is_code_path(path: &str) -> bool {
    classify_path(path) == PathClass::Code
}

/// Classify a batch as `(task_type, confidence)`.
///
/// A batch made only of test, doc or config paths gets that type. A batch
/// that only removes files is a refactor. Anything else is `edit_code`.
/// Confidence is the share of paths agreeing with the chosen type.
pub fn classify_batch(batch: &ChangeBatch) -> (&'static str, f64) {
    let paths = batch.paths();
    if paths.is_empty() {
        return (EDIT_CODE, 0.0);
    }
    let total = paths.len() as f64;
    let classes: Vec<PathClass> = paths.iter().map(|p| classify_path(p)).collect();
    let share = |class: PathClass| classes.iter().filter(|c| **c == class).count() as f64 / total;

    for (class, task_type) in [
        (PathClass::Test, WRITE_TESTS),
        (PathClass::Docs, WRITE_DOCS),
        (PathClass::Config, CONFIGURE),
    ] {
        if classes.iter().all(|c| *c == class) {
            return (task_type, 1.0);
        }
    }

    if batch.events.iter().all(|e| e.change_type == ChangeType::Removed) {
        return (REFACTOR, 1.0);
    }

    (EDIT_CODE, share(PathClass::Code))
}
