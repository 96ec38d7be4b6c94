//! Pipeline request types.
//!
//! Bodies arrive as untrusted JSON. Only the chat message list is
//! required; every other field is optional and read leniently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sovereign_ledger::lenient;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Why a request body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("`messages` must be an array of {{role, content}} objects")]
    InvalidMessages,

    #[error("Invalid mission packet: {0}")]
    InvalidMission(String),
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Anything not explicitly from the assistant counts as user-authored.
    pub fn is_assistant(&self) -> bool {
        self.role.trim().eq_ignore_ascii_case("assistant")
    }

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let role = match obj.get("role") {
            Some(Value::String(r)) if !r.trim().is_empty() => r.clone(),
            _ => "user".to_string(),
        };
        let content = obj.get("content").map(lenient::value_to_string).unwrap_or_default();
        Some(Self { role, content })
    }
}

/// Text of the most recent message not authored by the assistant.
pub fn last_user_text(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| !m.is_assistant())
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Chat-decision request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChatRequest {
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Output-length cap override
    pub max_tokens: Option<u32>,
    /// Explicit mission reference
    pub mission_id: Option<String>,
    /// Jurisdiction (defaults to the configured one)
    pub country: Option<String>,
    /// Sector focus (defaults to the configured one)
    pub focus: Option<String>,
    /// Start from a fresh ledger instead of the stored one
    pub reset_state: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Validate and read an untrusted request body.
    pub fn from_value(body: &Value) -> Result<Self, RequestError> {
        let items = body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or(RequestError::InvalidMessages)?;
        let messages = items
            .iter()
            .map(ChatMessage::from_value)
            .collect::<Option<Vec<_>>>()
            .ok_or(RequestError::InvalidMessages)?;

        Ok(Self {
            messages,
            temperature: body.get("temperature").and_then(Value::as_f64).map(|t| t as f32),
            max_tokens: body
                .get("max_tokens")
                .and_then(Value::as_f64)
                .filter(|n| n.is_finite() && *n >= 1.0)
                .map(|n| n.min(f64::from(u32::MAX)) as u32),
            mission_id: optional_string(body, "mission_id"),
            country: optional_string(body, "country"),
            focus: optional_string(body, "focus"),
            reset_state: truthy(body.get("reset_state")),
        })
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_mission(mut self, mission_id: impl Into<String>) -> Self {
        self.mission_id = Some(mission_id.into());
        self
    }

    pub fn with_reset(mut self) -> Self {
        self.reset_state = true;
        self
    }
}

/// Dataset-fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DatasetRequest {
    pub country: Option<String>,
    pub focus: Option<String>,
}

impl DatasetRequest {
    /// Read a request body; a malformed body means "all defaults".
    pub fn from_value(body: &Value) -> Self {
        Self {
            country: optional_string(body, "country"),
            focus: optional_string(body, "focus"),
        }
    }
}

/// Mission-set request.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionRequest {
    pub country: Option<String>,
    /// Make this the jurisdiction's active mission
    pub set_active: bool,
    /// Unvalidated packet body
    pub packet: Value,
}

impl MissionRequest {
    /// Read `{country?, set_active?, packet}`, or a bare packet as the body.
    pub fn from_value(body: Value) -> Self {
        let country = optional_string(&body, "country");
        let set_active = !matches!(body.get("set_active"), Some(Value::Bool(false)));
        let packet = match body.get("packet") {
            Some(packet) if !packet.is_null() => packet.clone(),
            _ => body,
        };
        Self {
            country,
            set_active,
            packet,
        }
    }
}

fn optional_string(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(lenient::value_to_string(other)),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
