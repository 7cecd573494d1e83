//! Proposal (change request) references.

use serde::{Deserialize, Serialize};

/// Identifier and URL of an opened change request.
///
/// This is also the payload stored on a completed `create_proposal`
/// idempotency record, so repeated triggers can replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRef {
    pub id: String,
    pub url: String,
}

impl ProposalRef {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// Payload for the completed idempotency record. Never `null`.
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({ "id": self.id, "url": self.url })
    }

    /// Parse a stored completion payload; `None` if it is not a reference.
    pub fn from_record(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_payload_is_an_object() {
        let proposal = ProposalRef::new("12", "https://example.com/pull/12");
        let payload = proposal.to_record();
        assert_eq!(payload, json!({"id": "12", "url": "https://example.com/pull/12"}));
        assert_eq!(ProposalRef::from_record(&payload), Some(proposal));
    }

    #[test]
    fn test_unusable_record_payloads() {
        assert_eq!(ProposalRef::from_record(&serde_json::Value::Null), None);
        assert_eq!(ProposalRef::from_record(&json!({"id": "1"})), None);
    }
}
