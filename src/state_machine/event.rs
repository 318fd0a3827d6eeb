//! Events that drive the session state machine

use super::state::ThreadId;
use crate::intervention::HumanResponse;
use crate::protocol::StreamEvent;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User actions
    UserMessage {
        thread: ThreadId,
        text: String,
    },
    HumanResponse {
        thread: ThreadId,
        response: HumanResponse,
    },
    /// Discard the conversation; `new_thread` is minted by the runtime
    Reset {
        new_thread: ThreadId,
    },

    // Transport events, tagged with the generation of the transport they came from
    Frame {
        generation: u64,
        event: StreamEvent,
    },
    TransportFailed {
        generation: u64,
        message: String,
    },
    /// Stream closed by the peer
    TransportEnded {
        generation: u64,
    },
}

impl Event {
    /// Transport generation, for transport events
    pub fn generation(&self) -> Option<u64> {
        match self {
            Event::Frame { generation, .. }
            | Event::TransportFailed { generation, .. }
            | Event::TransportEnded { generation } => Some(*generation),
            _ => None,
        }
    }
}
