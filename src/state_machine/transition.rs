//! Pure state transition function
//!
//! Session-level rules live here: the single-flight guard, resumption after a
//! human response, reset, and transport supersession. Per-frame turn handling
//! is in `turn`.

use super::state::{ConvContext, ConvState, SessionState, ThreadId, TurnKind, TurnState};
use super::{turn, Effect, Event};
use crate::intervention::{resume_request, HumanResponse};
use crate::protocol::{InterventionPrompt, StreamRequest};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
    /// Set when the event was dropped without changing anything
    pub ignored: Option<IgnoreReason>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            ignored: None,
        }
    }

    pub fn ignored(state: &ConvState, reason: IgnoreReason) -> Self {
        Self {
            new_state: state.clone(),
            effects: vec![],
            ignored: Some(reason),
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Came from a transport that has since been superseded or closed
    StaleGeneration,
    /// Not valid for the current turn phase (e.g. content after `end`)
    ProtocolViolation,
    /// Tag this client does not know
    UnknownEvent,
}

/// Rejections of user actions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A turn is already streaming; wait for it to finish")]
    AgentBusy,
    #[error("The agent is waiting for a human response")]
    AwaitingHuman,
    #[error("No human response is pending")]
    NotAwaitingHuman,
    #[error("Input is empty")]
    EmptyInput,
    #[error("A correction must carry at least one field")]
    EmptyCorrection,
    #[error("Thread {0} is not the current conversation")]
    UnknownThread(ThreadId),
    #[error("This backend has no resumption endpoint")]
    ResumptionUnsupported,
    #[error("The agent asked for a review; confirm or correct the fields")]
    ReviewExpected,
    #[error("The agent asked a question; reply with free text")]
    AnswerExpected,
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; all I/O is
/// expressed as effects.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    // Events from a transport other than the newest one are never applied
    if event
        .generation()
        .is_some_and(|generation| generation != state.generation)
    {
        return Ok(TransitionResult::ignored(state, IgnoreReason::StaleGeneration));
    }

    match (&state.session, event) {
        // ============================================================
        // User Message Handling
        // ============================================================
        (SessionState::Idle, Event::UserMessage { thread, text }) => {
            check_thread(state, &thread)?;
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyInput);
            }
            let generation = state.generation + 1;
            let request = StreamRequest::new(&context.endpoints.primary)
                .param("message", text)
                .param("thread_id", state.thread_id.as_str());
            Ok(begin_turn(state, generation, TurnKind::UserMessage)
                .with_effect(Effect::RecordUserEntry {
                    text: text.to_string(),
                })
                .with_effect(Effect::OpenTransport {
                    generation,
                    request,
                })
                .with_effect(Effect::notify_state(&SessionState::Streaming)))
        }

        (SessionState::Streaming, Event::UserMessage { .. } | Event::HumanResponse { .. }) => {
            Err(TransitionError::AgentBusy)
        }

        (SessionState::AwaitingHuman { .. }, Event::UserMessage { .. }) => {
            Err(TransitionError::AwaitingHuman)
        }

        // ============================================================
        // Human Response (resumption)
        // ============================================================
        (SessionState::AwaitingHuman { prompt }, Event::HumanResponse { thread, response }) => {
            check_thread(state, &thread)?;
            validate_response(prompt, &response)?;
            let endpoint = context
                .endpoints
                .resume
                .as_deref()
                .ok_or(TransitionError::ResumptionUnsupported)?;
            let generation = state.generation + 1;
            let request = resume_request(endpoint, &state.thread_id, &response);
            Ok(begin_turn(state, generation, TurnKind::Resumption)
                .with_effect(Effect::ClearPrompt)
                .with_effect(Effect::RecordUserEntry {
                    text: response.summary(),
                })
                .with_effect(Effect::OpenTransport {
                    generation,
                    request,
                })
                .with_effect(Effect::notify_state(&SessionState::Streaming)))
        }

        (SessionState::Idle, Event::HumanResponse { .. }) => {
            Err(TransitionError::NotAwaitingHuman)
        }

        // ============================================================
        // Reset
        // ============================================================
        (session, Event::Reset { new_thread }) => {
            let mut effects = vec![Effect::CloseTransport {
                generation: state.generation,
            }];
            if matches!(session, SessionState::AwaitingHuman { .. }) {
                effects.push(Effect::ClearPrompt);
            }
            effects.push(Effect::notify_state(&SessionState::Idle));

            // Bump the generation so frames already in flight become stale
            let new_state = ConvState {
                generation: state.generation + 1,
                ..ConvState::new(new_thread)
            };
            Ok(TransitionResult::new(new_state).with_effects(effects))
        }

        // ============================================================
        // Transport events for the current generation
        // ============================================================
        (_, Event::Frame { event, .. }) => Ok(turn::on_stream_event(state, event)),

        (_, Event::TransportFailed { message, .. }) => {
            Ok(turn::on_transport_failure(state, &message))
        }

        (_, Event::TransportEnded { .. }) => Ok(turn::on_transport_failure(
            state,
            "stream closed before the turn completed",
        )),
    }
}

fn check_thread(state: &ConvState, thread: &ThreadId) -> Result<(), TransitionError> {
    if *thread == state.thread_id {
        Ok(())
    } else {
        Err(TransitionError::UnknownThread(thread.clone()))
    }
}

/// The payload shape must match what the backend asked for: a review prompt
/// takes a confirmation or correction, a question takes free text.
fn validate_response(
    prompt: &InterventionPrompt,
    response: &HumanResponse,
) -> Result<(), TransitionError> {
    match (prompt.is_review(), response) {
        (true, HumanResponse::Guidance { .. }) => Err(TransitionError::ReviewExpected),
        (false, HumanResponse::Confirm | HumanResponse::Correct { .. }) => {
            Err(TransitionError::AnswerExpected)
        }
        (_, HumanResponse::Correct { fields }) if fields.is_empty() => {
            Err(TransitionError::EmptyCorrection)
        }
        (_, HumanResponse::Guidance { text }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyInput)
        }
        _ => Ok(()),
    }
}

/// New turn on a new transport generation. Earlier segments stay rendered; the
/// new turn starts with an empty buffer.
fn begin_turn(state: &ConvState, generation: u64, kind: TurnKind) -> TransitionResult {
    TransitionResult::new(ConvState {
        thread_id: state.thread_id.clone(),
        session: SessionState::Streaming,
        generation,
        turn: Some(TurnState::new(generation, kind)),
    })
}
