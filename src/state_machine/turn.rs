//! Turn controller: applies decoded stream events to the current turn

use super::state::{ConvState, SessionState, TurnPhase, TurnState};
use super::transition::{IgnoreReason, TransitionResult};
use super::Effect;
use crate::protocol::{InterventionPrompt, Notification, StreamEvent};

/// Shown when the transport drops after some content was rendered
pub const INTERRUPTED_MESSAGE: &str = "Connection to the agent was interrupted.";
/// Shown in place of an empty response when the transport drops
pub const FALLBACK_MESSAGE: &str = "Sorry, the agent could not respond right now. Please try again.";

pub(super) fn on_stream_event(state: &ConvState, event: StreamEvent) -> TransitionResult {
    let Some(turn) = state.turn.as_ref().filter(|t| !t.phase.is_terminal()) else {
        return TransitionResult::ignored(state, IgnoreReason::ProtocolViolation);
    };

    if matches!(event, StreamEvent::Unknown) {
        return TransitionResult::ignored(state, IgnoreReason::UnknownEvent);
    }
    if matches!(event, StreamEvent::Start) && turn.phase != TurnPhase::Created {
        return TransitionResult::ignored(state, IgnoreReason::ProtocolViolation);
    }

    let mut new_state = state.clone();
    let Some(turn) = new_state.turn.as_mut() else {
        return TransitionResult::ignored(state, IgnoreReason::ProtocolViolation);
    };
    turn.phase = TurnPhase::Active;
    let mut effects = Vec::new();

    match event {
        StreamEvent::Start | StreamEvent::Unknown => {}

        StreamEvent::Content { text } => {
            let outcome = turn.segments.append(&text);
            if outcome.opened {
                effects.push(Effect::CreatePlaceholder {
                    segment: outcome.segment,
                });
            }
            effects.push(Effect::RenderSegment {
                segment: outcome.segment,
                text: outcome.text,
            });
        }

        StreamEvent::AiDecision { note } => {
            notify(turn, Notification::AiDecision { note }, &mut effects);
        }
        StreamEvent::ToolCall { name, args } => {
            notify(turn, Notification::ToolCall { name, args }, &mut effects);
        }
        StreamEvent::ToolRunning { note } => {
            notify(turn, Notification::ToolRunning { note }, &mut effects);
        }
        StreamEvent::ToolResult { result } => {
            notify(turn, Notification::ToolResult { result }, &mut effects);
            // Text after a tool result belongs to a new segment
            turn.segments.note_tool_activity();
        }

        StreamEvent::End { .. } => {
            turn.phase = TurnPhase::Completed;
            new_state.session = SessionState::Idle;
            effects.push(Effect::CloseTransport {
                generation: state.generation,
            });
            effects.push(Effect::notify_state(&new_state.session));
        }

        StreamEvent::InterventionRequired { question, fields } => {
            turn.phase = TurnPhase::Suspended;
            let prompt = InterventionPrompt::new(question, fields);
            new_state.session = SessionState::AwaitingHuman {
                prompt: prompt.clone(),
            };
            effects.push(Effect::CloseTransport {
                generation: state.generation,
            });
            effects.push(Effect::PromptHuman { prompt });
            effects.push(Effect::notify_state(&new_state.session));
        }

        StreamEvent::Error { message } => {
            turn.phase = TurnPhase::Failed;
            let failure = failure_effect(turn, message);
            new_state.session = SessionState::Idle;
            effects.push(Effect::CloseTransport {
                generation: state.generation,
            });
            effects.push(failure);
            effects.push(Effect::notify_state(&new_state.session));
        }
    }

    TransitionResult::new(new_state).with_effects(effects)
}

/// Connection-level failure, or the stream closing with no terminal event.
/// `detail` is for logs only; the user sees a generic message.
pub(super) fn on_transport_failure(state: &ConvState, detail: &str) -> TransitionResult {
    if !state
        .turn
        .as_ref()
        .is_some_and(|t| !t.phase.is_terminal())
    {
        return TransitionResult::ignored(state, IgnoreReason::ProtocolViolation);
    }

    let mut new_state = state.clone();
    let Some(turn) = new_state.turn.as_mut() else {
        return TransitionResult::ignored(state, IgnoreReason::ProtocolViolation);
    };
    tracing::debug!(generation = state.generation, detail, "Turn failed at transport level");

    turn.phase = TurnPhase::Failed;
    let message = if turn.segments.has_content() {
        INTERRUPTED_MESSAGE
    } else {
        FALLBACK_MESSAGE
    };
    let failure = failure_effect(turn, message.to_string());
    new_state.session = SessionState::Idle;

    TransitionResult::new(new_state).with_effects([
        Effect::CloseTransport {
            generation: state.generation,
        },
        failure,
        Effect::notify_state(&SessionState::Idle),
    ])
}

fn notify(turn: &mut TurnState, notification: Notification, effects: &mut Vec<Effect>) {
    let (segment, opened) = turn.segments.ensure_active();
    if opened {
        effects.push(Effect::CreatePlaceholder { segment });
    }
    turn.notifications.push((segment, notification.clone()));
    effects.push(Effect::AppendNotification {
        segment,
        notification,
    });
}

fn failure_effect(turn: &TurnState, message: String) -> Effect {
    match turn.segments.active() {
        Some(segment) => Effect::RenderError { segment, message },
        None => Effect::ShowFailure { message },
    }
}
