//! Configuration for the decision pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::gateway::RetryPolicy;
use crate::prompt::NODE_ID;

/// Failure loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for a decision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Node identifier reported on every response
    pub node_id: String,
    /// Request defaults
    pub defaults: RequestDefaults,
    /// Sampling for the main decision call
    pub chat: SamplingConfig,
    /// Sampling for the repair call
    pub repair: SamplingConfig,
    /// Sampling for dataset generation
    pub dataset: SamplingConfig,
    /// Retry policy shared by every inference call
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_id: NODE_ID.to_string(),
            defaults: RequestDefaults::default(),
            chat: SamplingConfig {
                temperature: 0.10,
                max_tokens: 2400,
            },
            repair: SamplingConfig {
                temperature: 0.0,
                max_tokens: 1200,
            },
            dataset: SamplingConfig {
                temperature: 0.2,
                max_tokens: 1600,
            },
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&yaml)?)
    }
}

/// Values used when a request leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    /// Jurisdiction for chat, dataset and mission requests
    pub jurisdiction: String,
    /// Sector focus for chat requests
    pub focus: String,
    /// Sector focus for dataset requests
    pub dataset_focus: String,
    /// Mission used when neither the request nor the ledger names one
    pub mission_id: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            jurisdiction: "United Arab Emirates".to_string(),
            focus: "Semiconductors, Energy Systems, Food Security".to_string(),
            dataset_focus: "industrial imports".to_string(),
            mission_id: "UAE-SOV-IND-2026-ALPHA".to_string(),
        }
    }
}

/// Sampling parameters for one kind of inference call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}
