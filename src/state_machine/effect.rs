//! Effects produced by state transitions

use super::state::SessionState;
use crate::protocol::{InterventionPrompt, Notification, StreamRequest};

/// Effects to be executed by the runtime after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Add a human-authored entry to the conversation
    RecordUserEntry { text: String },

    /// Open a transport; any transport still open is closed first
    OpenTransport {
        generation: u64,
        request: StreamRequest,
    },

    /// Close the transport of `generation` if it is still open
    CloseTransport { generation: u64 },

    /// Create the render target for a newly opened segment
    CreatePlaceholder { segment: usize },

    /// Re-render the full accumulated text of a segment
    RenderSegment { segment: usize, text: String },

    AppendNotification {
        segment: usize,
        notification: Notification,
    },

    /// Show a failure inside an existing placeholder
    RenderError { segment: usize, message: String },

    /// Show a failure when the turn has no placeholder
    ShowFailure { message: String },

    /// Ask the human to answer a suspended turn
    PromptHuman { prompt: InterventionPrompt },

    /// Remove the awaiting-human affordance
    ClearPrompt,

    /// Publish the session status
    NotifyState { state: SessionState },
}

impl Effect {
    pub fn notify_state(state: &SessionState) -> Self {
        Effect::NotifyState {
            state: state.clone(),
        }
    }
}
