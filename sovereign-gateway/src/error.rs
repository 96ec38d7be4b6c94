//! Gateway error types.

use sovereign_agent::{ConfigError, LlmError};
use sovereign_ledger::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline configuration error: {0}")]
    PipelineConfig(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Store(#[from] StoreError),

    #[error("Inference backend error: {0}")]
    Backend(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
