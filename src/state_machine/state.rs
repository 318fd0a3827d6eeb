//! Session and turn state types

use crate::config::Endpoints;
use crate::protocol::{InterventionPrompt, Notification};
use crate::segment::SegmentBuffer;
use rand::Rng;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Thread identity
// ============================================================================

const THREAD_SUFFIX_LEN: usize = 9;

/// Correlates every transport of one logical conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Mint a fresh id from the current time plus a random suffix
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..THREAD_SUFFIX_LEN)
            .map(|_| char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
            .collect();
        Self(format!("thread_{millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Canonical session status, shared with the renderer and observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for user input
    #[default]
    Idle,
    /// A turn is streaming on the current transport
    Streaming,
    /// Suspended until the human answers the prompt
    AwaitingHuman { prompt: InterventionPrompt },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::AwaitingHuman { .. } => "awaiting_human",
        }
    }
}

// ============================================================================
// Turn State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Transport requested, nothing received yet
    Created,
    /// Events are flowing
    Active,
    Completed,
    /// Waiting on a human; continues as a new turn on a resumption transport
    Suspended,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnPhase::Completed | TurnPhase::Suspended | TurnPhase::Failed
        )
    }
}

/// What opened the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    UserMessage,
    Resumption,
}

/// One request/response cycle on one transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnState {
    /// Generation of the transport this turn reads from
    pub generation: u64,
    pub kind: TurnKind,
    pub phase: TurnPhase,
    pub segments: SegmentBuffer,
    /// Notifications in arrival order, with the segment each attached to
    pub notifications: Vec<(usize, Notification)>,
}

impl TurnState {
    pub fn new(generation: u64, kind: TurnKind) -> Self {
        Self {
            generation,
            kind,
            phase: TurnPhase::Created,
            segments: SegmentBuffer::new(),
            notifications: Vec::new(),
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// All mutable session state, owned by one runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvState {
    pub thread_id: ThreadId,
    pub session: SessionState,
    /// Generation of the newest transport; frames tagged otherwise are stale
    pub generation: u64,
    /// Current or most recent turn
    pub turn: Option<TurnState>,
}

impl ConvState {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            session: SessionState::Idle,
            generation: 0,
            turn: None,
        }
    }
}

/// Immutable configuration for a session
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub endpoints: Endpoints,
}

impl ConvContext {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}
