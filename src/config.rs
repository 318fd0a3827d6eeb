//! Client configuration
//!
//! Read from the environment, the same way the rest of the stack is configured.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend mode '{0}' (expected chat, tool, human-loop or customize-state)")]
    UnknownMode(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Which route family of the backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// Plain streaming chat
    Chat,
    /// Chat with tool calls
    Tool,
    /// Tool chat that may ask the human for free-text help
    #[default]
    HumanLoop,
    /// Tool chat that asks the human to review extracted fields
    CustomizeState,
}

impl BackendMode {
    pub fn endpoints(self) -> Endpoints {
        match self {
            BackendMode::Chat => Endpoints::new("/chat/stream", None),
            BackendMode::Tool => Endpoints::new("/tool/stream", None),
            BackendMode::HumanLoop => {
                Endpoints::new("/human-loop/chat/stream", Some("/human-loop/respond/stream"))
            }
            BackendMode::CustomizeState => Endpoints::new(
                "/customize-state/chat/stream",
                Some("/customize-state/respond/stream"),
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendMode::Chat => "chat",
            BackendMode::Tool => "tool",
            BackendMode::HumanLoop => "human-loop",
            BackendMode::CustomizeState => "customize-state",
        }
    }
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(BackendMode::Chat),
            "tool" => Ok(BackendMode::Tool),
            "human-loop" | "human_loop" => Ok(BackendMode::HumanLoop),
            "customize-state" | "customize_state" => Ok(BackendMode::CustomizeState),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Stream endpoint paths for one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Opens a turn from user input
    pub primary: String,
    /// Continues a suspended turn; absent when the backend cannot suspend
    pub resume: Option<String>,
}

impl Endpoints {
    pub fn new(primary: impl Into<String>, resume: Option<&str>) -> Self {
        Self {
            primary: primary.into(),
            resume: resume.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub mode: BackendMode,
    /// Applies to connection setup only; open streams never time out
    pub connect_timeout: Duration,
    /// Emit logs as JSON instead of text
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            mode: BackendMode::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            log_json: false,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let base_url = lookup("HITL_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.base_url);

        let mode = lookup("HITL_MODE")
            .map(|mode| mode.parse())
            .transpose()?
            .unwrap_or(defaults.mode);

        let connect_timeout = match lookup("HITL_CONNECT_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    name: "HITL_CONNECT_TIMEOUT_SECS",
                    value,
                })?,
            None => defaults.connect_timeout,
        };

        let log_json = lookup("HITL_LOG_JSON").is_some_and(|v| matches!(v.as_str(), "1" | "true"));

        Ok(Self {
            base_url,
            mode,
            connect_timeout,
            log_json,
        })
    }
}
