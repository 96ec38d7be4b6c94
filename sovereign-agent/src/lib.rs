//! Sovereign Agent - Decision Pipeline
//!
//! Turns a conversation plus the persisted sovereign ledger into a
//! schema-constrained decision record:
//! - Trait-based LLM backends (OpenAI-compatible, scripted mock)
//! - Bounded retries with per-attempt deadlines
//! - Structured output extraction with a repair pass and safe stubs
//! - Deterministic accounting and phase control from `sovereign-ledger`
//! - Hash-chained audit trail per jurisdiction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           DecisionPipeline              │
//! │  (chat / dataset / mission / audit)     │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────┐ ┌──────────────┐
//! │Inference │ │ Output   │ │ LedgerStore  │
//! │Gateway   │ │ Repairer │ │ Enforcer     │
//! │(LlmBack.)│ │          │ │ PhaseAutomat.│
//! └──────────┘ └──────────┘ └──────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod config;
pub mod extract;
pub mod gateway;
pub mod prompt;
pub mod repair;
pub mod request;
pub mod response;
pub mod service;

// Re-export main types for convenience
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use backend::{MockBackend, MockReply, OpenAiBackend};
pub use config::{ConfigError, PipelineConfig, RequestDefaults, SamplingConfig};
pub use extract::extract_structured;
pub use gateway::{retry_with_timeout, InferenceFailure, InferenceGateway, RetryPolicy};
pub use prompt::{PromptAssembler, NODE_ID};
pub use repair::{OutputRepairer, RecordSource, Recovered};
pub use request::{ChatMessage, ChatRequest, DatasetRequest, MissionRequest, RequestError};
pub use response::{
    AuditTrail, ChatResponse, DatasetResponse, HealthResponse, MissionSetResponse, MissionView,
};
pub use service::{DecisionPipeline, PipelineError};
