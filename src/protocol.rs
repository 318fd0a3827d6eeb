//! Wire protocol for the agent event stream
//!
//! Every server-push frame carries one JSON object tagged by `type`. Decoding is
//! tolerant: unknown tags become [`StreamEvent::Unknown`] and extra keys such as
//! `metadata` or `thread_id` are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Question used when the backend suspends a turn without saying why
pub const DEFAULT_QUESTION: &str = "Human assistance required";
/// Tool name reported when a `tool_call` frame does not name one
pub const UNKNOWN_TOOL: &str = "unknown";

/// One frame as delivered by the transport, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub data: String,
}

impl RawFrame {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// Frame decode failure. Never fatal to the stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("frame does not match the event schema: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Data extracted by the backend that a reviewer may confirm or correct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
}

impl ReviewFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.birthday.is_none()
    }

    /// Query parameters for the fields that are present, in a stable order
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.name {
            params.push(("name".to_string(), name.clone()));
        }
        if let Some(birthday) = &self.birthday {
            params.push(("birthday".to_string(), birthday.clone()));
        }
        params
    }
}

/// Counters the backend attaches to `end`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamSummary {
    #[serde(default)]
    pub total_chunks: Option<u64>,
    #[serde(default)]
    pub total_length: Option<u64>,
}

/// Typed event decoded from one frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start,
    Content {
        #[serde(alias = "content")]
        text: String,
    },
    AiDecision {
        #[serde(default, alias = "content")]
        note: String,
    },
    ToolCall {
        /// Some backends send `tool` and leave it `null` when no tool was chosen
        #[serde(
            default = "unknown_tool",
            alias = "tool_name",
            alias = "tool",
            deserialize_with = "tool_name"
        )]
        name: String,
        #[serde(default, alias = "tool_args")]
        args: Value,
    },
    ToolResult {
        #[serde(default)]
        result: Value,
    },
    ToolRunning {
        #[serde(default, alias = "content")]
        note: String,
    },
    InterventionRequired {
        #[serde(default = "default_question", alias = "query")]
        question: String,
        #[serde(flatten)]
        fields: ReviewFields,
    },
    End {
        #[serde(default)]
        metadata: Option<StreamSummary>,
    },
    Error {
        #[serde(alias = "error", alias = "content")]
        message: String,
    },
    /// Tag this client does not know; ignored
    #[serde(other)]
    Unknown,
}

fn default_question() -> String {
    DEFAULT_QUESTION.to_string()
}

fn unknown_tool() -> String {
    UNKNOWN_TOOL.to_string()
}

fn tool_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown_tool))
}

impl StreamEvent {
    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start => "start",
            StreamEvent::Content { .. } => "content",
            StreamEvent::AiDecision { .. } => "ai_decision",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::ToolRunning { .. } => "tool_running",
            StreamEvent::InterventionRequired { .. } => "intervention_required",
            StreamEvent::End { .. } => "end",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Unknown => "unknown",
        }
    }
}

/// Decode one raw frame.
///
/// A frame that is not JSON, or whose known `type` lacks a required field, is a
/// [`DecodeError`]; an unrecognised `type` decodes to [`StreamEvent::Unknown`].
pub fn decode_frame(frame: &RawFrame) -> Result<StreamEvent, DecodeError> {
    let value: Value = serde_json::from_str(frame.data.trim()).map_err(DecodeError::NotJson)?;
    serde_json::from_value(value).map_err(DecodeError::Schema)
}

/// Tool or decision activity shown alongside a response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    AiDecision { note: String },
    ToolCall { name: String, args: Value },
    ToolRunning { note: String },
    ToolResult { result: Value },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::AiDecision { .. } => "ai_decision",
            Notification::ToolCall { .. } => "tool_call",
            Notification::ToolRunning { .. } => "tool_running",
            Notification::ToolResult { .. } => "tool_result",
        }
    }

    /// Payload without the kind tag
    pub fn data(&self) -> Value {
        match self {
            Notification::AiDecision { note } | Notification::ToolRunning { note } => {
                serde_json::json!({ "note": note })
            }
            Notification::ToolCall { name, args } => {
                serde_json::json!({ "name": name, "args": args })
            }
            Notification::ToolResult { result } => serde_json::json!({ "result": result }),
        }
    }
}

/// What the backend asked the human
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterventionPrompt {
    pub question: String,
    /// Present when the backend wants extracted data reviewed
    pub fields: Option<ReviewFields>,
}

impl InterventionPrompt {
    pub fn new(question: impl Into<String>, fields: ReviewFields) -> Self {
        Self {
            question: question.into(),
            fields: if fields.is_empty() { None } else { Some(fields) },
        }
    }

    pub fn is_review(&self) -> bool {
        self.fields.is_some()
    }
}

/// An event-stream request: endpoint path plus query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl StreamRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.params.extend(params);
        self
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
