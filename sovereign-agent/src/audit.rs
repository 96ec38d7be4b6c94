//! Audit trail for pipeline runs.
//!
//! Each chat request appends its stages to the jurisdiction's hash chain:
//! `INGEST`, `PLAN`, then `GUARD_CHECK` and `PUBLISH` when the record was
//! enforced. The chain is persisted through the ledger store.

use serde_json::{json, Value};
use tracing::{error, warn};

use sovereign_ledger::{
    AuditChain, AuditStage, DecisionRecord, EnforcementOutcome, LedgerStore, PhaseTransition,
    SovereignState, StateUpdate,
};

use crate::repair::Recovered;

/// Records one request's stages on its jurisdiction's chain.
pub struct AuditRecorder {
    jurisdiction: String,
    request_id: String,
    chain: AuditChain,
    appended: usize,
}

impl AuditRecorder {
    /// Load the jurisdiction's chain and start recording a new request.
    pub async fn begin(store: &LedgerStore, jurisdiction: &str) -> Self {
        Self {
            jurisdiction: jurisdiction.to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
            chain: store.load_audit(jurisdiction).await,
            appended: 0,
        }
    }

    /// Request identifier carried in every payload.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Events appended by this recorder.
    pub fn appended(&self) -> usize {
        self.appended
    }

    fn record(&mut self, stage: AuditStage, event: &str, mut payload: Value) {
        if let Value::Object(map) = &mut payload {
            map.insert("request_id".to_string(), Value::String(self.request_id.clone()));
        }
        self.chain.record(stage, event, payload);
        self.appended += 1;
    }

    pub fn ingest(&mut self, mission_id: &str, focus: &str, message_count: usize, reset_state: bool) {
        self.record(
            AuditStage::Ingest,
            "chat_request_accepted",
            json!({
                "mission_id": mission_id,
                "focus": focus,
                "messages": message_count,
                "reset_state": reset_state,
            }),
        );
    }

    pub fn plan(&mut self, recovered: &Recovered) {
        self.record(
            AuditStage::Plan,
            "decision_extracted",
            json!({
                "source": recovered.source,
                "repair_attempted": recovered.repair_attempted,
                "model_verdict": recovered.record.verdict(),
                "resource_request": recovered.record.planner.resource_request,
                "staffing_request": recovered.record.planner.staffing_request,
            }),
        );
    }

    /// The primary inference call failed and a stub was returned.
    pub fn inference_failed(&mut self, record: &DecisionRecord, error: &str) {
        self.record(
            AuditStage::Plan,
            "inference_failed",
            json!({
                "source": "stub",
                "error": error,
                "verdict": record.verdict(),
                "reasons": record.guard.as_ref().map(|g| g.reasons.clone()).unwrap_or_default(),
            }),
        );
    }

    pub fn guard_check(&mut self, outcome: &EnforcementOutcome, record: &DecisionRecord) {
        let guard = record.guard.clone().unwrap_or_default();
        self.record(
            AuditStage::GuardCheck,
            "accounting_enforced",
            json!({
                "verdict": outcome.verdict(),
                "security_override": outcome.security_override,
                "exceedance_override": outcome.exceedance_override,
                "resource_request": outcome.resource_request,
                "staffing_request": outcome.staffing_request,
                "reasons": guard.reasons,
                "risk_flags": guard.risk_flags,
            }),
        );
    }

    pub fn publish(&mut self, transition: Option<PhaseTransition>, state: &SovereignState) {
        let (from, to) = match transition {
            Some(t) => (t.from, t.to),
            None => (state.phase_cursor, state.phase_cursor),
        };
        self.record(
            AuditStage::Publish,
            "ledger_published",
            json!({
                "phase_from": from,
                "phase_to": to,
                "remaining": StateUpdate::from_state(state),
            }),
        );
    }

    /// Persist the chain. Failures are logged, never surfaced.
    ///
    /// A chain that did not load intact is left as stored and this
    /// request's events are dropped.
    pub async fn commit(self, store: &LedgerStore) -> AuditChain {
        if self.appended > 0 && !self.chain.is_intact() {
            error!(
                jurisdiction = %self.jurisdiction,
                request_id = %self.request_id,
                dropped = self.appended,
                broken_at = ?self.chain.validate().broken_at,
                "Stored audit chain is damaged, not appending"
            );
        } else if self.appended > 0 {
            if let Err(e) = store.save_audit(&self.jurisdiction, &self.chain).await {
                warn!(
                    jurisdiction = %self.jurisdiction,
                    request_id = %self.request_id,
                    error = %e,
                    "Failed to persist audit chain"
                );
            }
        }
        self.chain
    }
}
