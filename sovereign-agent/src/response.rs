//! Pipeline response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sovereign_ledger::{AuditEvent, ChainValidation, DatasetRow, DecisionRecord, MissionPacket};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Result of a chat-decision request.
///
/// Always well-formed; failures surface as a vetoed stub record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChatResponse {
    /// Compact JSON text of `json`
    pub text: String,
    /// The final decision record
    pub json: DecisionRecord,
    /// Node identifier
    pub node: String,
    /// Inference failure description, when the stub path was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn new(record: DecisionRecord, node: impl Into<String>) -> Self {
        Self {
            text: record.to_text(),
            json: record,
            node: node.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result of a dataset-fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DatasetResponse {
    pub rows: Vec<DatasetRow>,
    /// `"fallback"` when the rows are synthetic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DatasetResponse {
    pub fn is_fallback(&self) -> bool {
        self.note.as_deref() == Some(FALLBACK_NOTE)
    }
}

pub(crate) const FALLBACK_NOTE: &str = "fallback";

/// Result of a mission-set request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MissionSetResponse {
    pub ok: bool,
    /// Set only when the mission was activated
    pub active_mission_id: Option<String>,
}

/// Active mission of a jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MissionView {
    pub active_mission_id: Option<String>,
    pub packet: Option<MissionPacket>,
}

/// A jurisdiction's audit events and their validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub events: Vec<AuditEvent>,
    /// Stored records from the first one that no longer decodes, as stored
    #[serde(
        rename = "undecodedEvents",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub undecoded_events: Vec<Value>,
    #[serde(flatten)]
    pub validation: ChainValidation,
}

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct HealthResponse {
    pub ok: bool,
    pub node: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sovereign_ledger::{SovereignState, StubReason};

    #[test]
    fn test_chat_response_mirrors_record() {
        let state = SovereignState::new("UAE");
        let record = DecisionRecord::stub(StubReason::NonConformantOutput, "M", "O", &state);
        let response = ChatResponse::new(record.clone(), "NODE");

        let parsed: serde_json::Value = serde_json::from_str(&response.text).unwrap();
        assert_eq!(parsed, record.to_value());

        let wire = serde_json::to_value(&response).unwrap();
        assert!(wire.get("error").is_none());
        assert_eq!(wire["node"], "NODE");

        let failed = serde_json::to_value(response.with_error("timeout")).unwrap();
        assert_eq!(failed["error"], "timeout");
    }

    #[test]
    fn test_audit_trail_flattens_validation() {
        let trail = AuditTrail {
            events: Vec::new(),
            undecoded_events: Vec::new(),
            validation: ChainValidation::valid(),
        };
        assert_eq!(
            serde_json::to_value(&trail).unwrap(),
            json!({"events": [], "isValid": true, "brokenAt": null})
        );

        let damaged = AuditTrail {
            events: Vec::new(),
            undecoded_events: vec![json!({"stage": "TAMPERED"})],
            validation: ChainValidation::broken_at(0),
        };
        assert_eq!(
            serde_json::to_value(&damaged).unwrap(),
            json!({
                "events": [],
                "undecodedEvents": [{"stage": "TAMPERED"}],
                "isValid": false,
                "brokenAt": 0
            })
        );
    }
}
