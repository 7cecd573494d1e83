//! Infrastructure adapters for external systems.

pub mod backend;
pub mod detectors;
pub mod memory;
pub mod sqlite;
pub mod vcs;

pub use backend::{BackendKind, PersistenceBackend};
pub use detectors::{RegexDetector, RegexRule};
pub use memory::InMemoryStore;
