//! DecisionPipeline - main entry point for pipeline requests.
//!
//! Orchestrates the ledger, the inference gateway, output recovery, the
//! accounting enforcer and the phase automaton for one request at a time.
//! Model and network failures degrade to a vetoed stub; only malformed
//! caller input is rejected.

use std::sync::Arc;

use tracing::{debug, info, warn};

use sovereign_ledger::{
    fallback_rows, rows_from_value, AccountingEnforcer, DecisionRecord, LedgerStore, MissionError,
    MissionPacket, PhaseAutomaton, SovereignState, StateUpdate, StoreError, StubReason, Verdict,
};

use crate::audit::AuditRecorder;
use crate::backend::LlmBackend;
use crate::config::PipelineConfig;
use crate::extract::extract_structured;
use crate::gateway::InferenceGateway;
use crate::prompt::PromptAssembler;
use crate::repair::{OutputRepairer, RepairContext};
use crate::request::{last_user_text, ChatRequest, DatasetRequest, MissionRequest, RequestError};
use crate::response::{
    AuditTrail, ChatResponse, DatasetResponse, HealthResponse, MissionSetResponse, MissionView,
    FALLBACK_NOTE,
};

/// Error types for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed request body
    #[error("Bad Request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// Mission packet failed validation
    #[error("Invalid mission packet: {0}")]
    InvalidMission(#[from] MissionError),

    /// A mission could not be persisted
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// The sovereign decision pipeline.
#[derive(Clone)]
pub struct DecisionPipeline {
    gateway: InferenceGateway,
    store: LedgerStore,
    config: Arc<PipelineConfig>,
}

impl DecisionPipeline {
    pub fn new(backend: Arc<dyn LlmBackend>, store: LedgerStore, config: PipelineConfig) -> Self {
        Self {
            gateway: InferenceGateway::new(backend, config.retry),
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    fn jurisdiction_or_default<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.config.defaults.jurisdiction)
    }

    /// Run one chat-decision request.
    pub async fn chat(&self, request: ChatRequest) -> ChatResponse {
        let defaults = &self.config.defaults;
        let jurisdiction = self.jurisdiction_or_default(request.country.as_deref());
        let focus = request.focus.as_deref().unwrap_or(&defaults.focus);

        let mut state = if request.reset_state {
            SovereignState::new(jurisdiction)
        } else {
            self.store.load_state(jurisdiction).await
        };
        state.last_focus = Some(focus.to_string());

        let mission_id = match request.mission_id.clone().or_else(|| state.active_mission_id.clone()) {
            Some(id) => id,
            None => self
                .store
                .active_mission(jurisdiction)
                .await
                .unwrap_or_else(|| defaults.mission_id.clone()),
        };
        state.active_mission_id = Some(mission_id.clone());
        if let Err(e) = self.store.set_active_mission(jurisdiction, &mission_id).await {
            warn!(jurisdiction, mission_id = %mission_id, error = %e, "Failed to write active mission");
        }

        let packet = self.store.load_mission(&mission_id).await;
        let dataset = self.store.load_dataset(jurisdiction, focus).await;

        let mut audit = AuditRecorder::begin(&self.store, jurisdiction).await;
        audit.ingest(&mission_id, focus, request.messages.len(), request.reset_state);

        let prompt = PromptAssembler::decision_prompt(
            &self.config.node_id,
            &state,
            packet.as_ref(),
            dataset.as_ref(),
            &request.messages,
            &mission_id,
        );
        let last_user = last_user_text(&request.messages);

        let temperature = request.temperature.unwrap_or(self.config.chat.temperature);
        let max_tokens = request.max_tokens.unwrap_or(self.config.chat.max_tokens);

        info!(
            request_id = audit.request_id(),
            jurisdiction = %state.jurisdiction,
            mission_id = %mission_id,
            phase = %state.phase_cursor,
            "Processing chat request"
        );

        let raw = match self.gateway.invoke(&prompt.text, max_tokens, temperature).await {
            Ok(text) => text,
            Err(failure) => {
                warn!(
                    request_id = audit.request_id(),
                    attempts = failure.attempts,
                    timed_out = failure.timed_out(),
                    "Inference exhausted, returning stub"
                );
                let stub = DecisionRecord::stub(
                    StubReason::InferenceFailure {
                        timed_out: failure.timed_out(),
                    },
                    &mission_id,
                    &prompt.objective,
                    &state,
                );
                let error = failure.to_string();
                audit.inference_failed(&stub, &error);
                audit.commit(&self.store).await;
                return ChatResponse::new(stub, self.config.node_id.clone()).with_error(error);
            }
        };

        let context = RepairContext {
            mission_id: &mission_id,
            objective: &prompt.objective,
            phase: state.phase_cursor,
        };
        let recovered = OutputRepairer::new(&self.gateway, self.config.repair)
            .recover(&raw, context, &state)
            .await;
        audit.plan(&recovered);

        let mut record = recovered.record;
        record.mission_id = mission_id.clone();
        record.objective = prompt.objective.clone();
        record.phase_cursor = state.phase_cursor;

        let outcome = AccountingEnforcer::enforce(&mut state, &mut record);
        let transition = PhaseAutomaton::apply(&mut state, outcome.approved, last_user);
        record.state_update = StateUpdate::from_state(&state);
        if !outcome.approved {
            record.guard_mut().verdict = Verdict::Vetoed;
        }

        if let Err(e) = self.store.save_state(&mut state).await {
            warn!(jurisdiction = %state.jurisdiction, error = %e, "Failed to save state");
        }

        audit.guard_check(&outcome, &record);
        audit.publish(transition, &state);
        let request_id = audit.request_id().to_string();
        audit.commit(&self.store).await;

        info!(
            request_id = %request_id,
            verdict = ?outcome.verdict(),
            overridden = outcome.overridden(),
            source = ?recovered.source,
            phase = %state.phase_cursor,
            "Chat request complete"
        );

        ChatResponse::new(record, self.config.node_id.clone())
    }

    /// Generate and cache a trade-dependency dataset.
    ///
    /// Any inference or extraction failure yields the synthetic fallback.
    pub async fn fetch_dataset(&self, request: DatasetRequest) -> DatasetResponse {
        let jurisdiction = self.jurisdiction_or_default(request.country.as_deref());
        let focus = request
            .focus
            .as_deref()
            .unwrap_or(&self.config.defaults.dataset_focus);

        let prompt = PromptAssembler::dataset_prompt(jurisdiction, focus);
        let sampling = self.config.dataset;
        let rows = match self
            .gateway
            .invoke(&prompt, sampling.max_tokens, sampling.temperature)
            .await
        {
            Ok(text) => extract_structured(&text).and_then(|value| rows_from_value(&value)),
            Err(e) => {
                warn!(jurisdiction, focus, error = %e, "Dataset inference failed");
                None
            }
        };

        let response = match rows {
            Some(rows) => DatasetResponse { rows, note: None },
            None => {
                info!(jurisdiction, focus, "Using fallback dataset");
                DatasetResponse {
                    rows: fallback_rows(jurisdiction, focus),
                    note: Some(FALLBACK_NOTE.to_string()),
                }
            }
        };

        if let Err(e) = self.store.save_dataset(jurisdiction, focus, &response.rows).await {
            warn!(jurisdiction, focus, error = %e, "Failed to save dataset");
        }
        debug!(jurisdiction, focus, rows = response.rows.len(), "Dataset ready");
        response
    }

    /// Validate and store a mission packet, optionally activating it.
    pub async fn set_mission(&self, request: MissionRequest) -> Result<MissionSetResponse, PipelineError> {
        let packet = MissionPacket::from_value(&request.packet)?;
        self.store.save_mission(&packet).await?;

        let jurisdiction = self.jurisdiction_or_default(request.country.as_deref());
        if request.set_active {
            self.store
                .set_active_mission(jurisdiction, &packet.mission_id)
                .await?;
            let mut state = self.store.load_state(jurisdiction).await;
            state.active_mission_id = Some(packet.mission_id.clone());
            self.store.save_state(&mut state).await?;
        }

        info!(
            jurisdiction,
            mission_id = %packet.mission_id,
            activated = request.set_active,
            "Mission stored"
        );

        Ok(MissionSetResponse {
            ok: true,
            active_mission_id: request.set_active.then(|| packet.mission_id.clone()),
        })
    }

    /// The jurisdiction's active mission, if any.
    pub async fn get_mission(&self, country: Option<&str>) -> MissionView {
        let jurisdiction = self.jurisdiction_or_default(country);
        let Some(active) = self.store.active_mission(jurisdiction).await else {
            return MissionView::default();
        };
        let packet = self.store.load_mission(&active).await;
        MissionView {
            active_mission_id: Some(active),
            packet,
        }
    }

    /// The jurisdiction's audit events with their validation result.
    pub async fn audit_trail(&self, country: Option<&str>) -> AuditTrail {
        let jurisdiction = self.jurisdiction_or_default(country);
        let chain = self.store.load_audit(jurisdiction).await;
        let validation = chain.validate();
        if !validation.is_valid {
            warn!(jurisdiction, broken_at = ?validation.broken_at, "Audit chain failed validation");
        }
        AuditTrail {
            undecoded_events: chain.undecoded().to_vec(),
            events: chain.into_events(),
            validation,
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            ok: true,
            node: self.config.node_id.clone(),
            model: self.gateway.model().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::request::ChatMessage;
    use serde_json::json;

    fn pipeline(backend: MockBackend) -> (Arc<MockBackend>, DecisionPipeline) {
        let backend = Arc::new(backend);
        let pipeline = DecisionPipeline::new(
            backend.clone(),
            LedgerStore::in_memory(),
            PipelineConfig::default(),
        );
        (backend, pipeline)
    }

    #[tokio::test]
    async fn test_mission_resolution_order() {
        let (_, pipeline) = pipeline(MockBackend::default().with_response("{}"));

        let response = pipeline
            .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert_eq!(response.json.mission_id, "UAE-SOV-IND-2026-ALPHA");

        let response = pipeline
            .chat(ChatRequest::new(vec![ChatMessage::user("hi")]).with_mission("M-2"))
            .await;
        assert_eq!(response.json.mission_id, "M-2");

        // the state now remembers M-2
        let response = pipeline
            .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert_eq!(response.json.mission_id, "M-2");
        assert_eq!(
            pipeline.get_mission(None).await.active_mission_id.as_deref(),
            Some("M-2")
        );
    }

    #[tokio::test]
    async fn test_missing_guard_is_vetoed() {
        let (_, pipeline) = pipeline(MockBackend::default().with_response(
            r#"{"planner": {"resource_request": {"power_mw": 5}}}"#,
        ));
        let response = pipeline
            .chat(ChatRequest::new(vec![ChatMessage::user("go")]))
            .await;

        let guard = response.json.guard.clone().unwrap();
        assert_eq!(guard.verdict, Verdict::Vetoed);
        assert!(guard.reasons.contains(&"MISSING_GUARD".to_string()));
        let state = pipeline.store().load_state("United Arab Emirates").await;
        assert_eq!(state.power.used, 0.0);
        assert_eq!(state.allocations.len(), 1);
    }

    #[tokio::test]
    async fn test_set_and_get_mission() {
        let (_, pipeline) = pipeline(MockBackend::default());
        let body = json!({
            "country": "Oman",
            "packet": {
                "mission_id": "OM-1",
                "objective": "Grid",
                "status": "DRAFT",
                "phases": {}
            }
        });
        let response = pipeline
            .set_mission(MissionRequest::from_value(body))
            .await
            .unwrap();
        assert_eq!(response.active_mission_id.as_deref(), Some("OM-1"));

        let view = pipeline.get_mission(Some("oman")).await;
        assert_eq!(view.active_mission_id.as_deref(), Some("OM-1"));
        assert_eq!(view.packet.unwrap().objective, "Grid");
        let state = pipeline.store().load_state("OMAN").await;
        assert_eq!(state.active_mission_id.as_deref(), Some("OM-1"));

        assert_eq!(pipeline.get_mission(None).await, MissionView::default());
    }

    #[tokio::test]
    async fn test_inactive_mission_and_invalid_packet() {
        let (_, pipeline) = pipeline(MockBackend::default());
        let body = json!({
            "set_active": false,
            "mission_id": "X-1",
            "objective": "o",
            "status": "s",
            "phases": {}
        });
        let response = pipeline
            .set_mission(MissionRequest::from_value(body))
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.active_mission_id, None);
        assert!(pipeline.store().load_mission("X-1").await.is_some());
        assert_eq!(pipeline.get_mission(None).await.active_mission_id, None);

        let invalid = MissionRequest::from_value(json!({"mission_id": "", "objective": "o"}));
        assert!(matches!(
            pipeline.set_mission(invalid).await,
            Err(PipelineError::InvalidMission(MissionError::MissingField("mission_id")))
        ));
    }

    #[tokio::test]
    async fn test_dataset_accepts_bare_array() {
        let (_, pipeline) = pipeline(MockBackend::default().then_text(
            r#"[{"hs_code": "2709.00", "category": "Crude", "country": "Oman", "value_usd": "1000"}]"#,
        ));
        let response = pipeline
            .fetch_dataset(DatasetRequest {
                country: Some("Oman".into()),
                focus: Some("energy".into()),
            })
            .await;
        assert!(!response.is_fallback());
        assert_eq!(response.rows[0].value, 1000.0);

        let cached = pipeline.store().load_dataset("Oman", "Energy").await.unwrap();
        assert_eq!(cached.rows, response.rows);
    }

    #[tokio::test]
    async fn test_health() {
        let (_, pipeline) = pipeline(MockBackend::new("llama-test"));
        let health = pipeline.health();
        assert!(health.ok);
        assert_eq!(health.model, "llama-test");
        assert_eq!(health.node, "MISSION ORCHESTRATOR V3.2.1");
    }
}
