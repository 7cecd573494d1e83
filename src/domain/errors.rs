//! Domain errors for the changeward pipeline.

use thiserror::Error;

/// Domain-level errors that can occur while aggregating, proposing or scoring.
///
/// The variants map onto the error taxonomy the pipeline reasons about:
/// persistence and VCS failures are transient, configuration failures are
/// fatal at startup, validation failures skip a single item, and
/// concurrency conflicts are expected control flow.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("VCS error: {0}")]
    VcsError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Concurrency conflict: {operation} for {identifier} is already in flight")]
    ConcurrencyConflict { operation: String, identifier: String },
}

impl DomainError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::VcsError(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DomainError::DatabaseError("locked".into()).is_transient());
        assert!(DomainError::VcsError("push rejected".into()).is_transient());
        assert!(!DomainError::ValidationFailed("bad".into()).is_transient());
        assert!(!DomainError::ConfigurationError("bad".into()).is_transient());
    }

    #[test]
    fn test_conflict_message_names_operation() {
        let err = DomainError::ConcurrencyConflict {
            operation: "create_proposal".into(),
            identifier: "s1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Concurrency conflict: create_proposal for s1 is already in flight"
        );
    }
}
