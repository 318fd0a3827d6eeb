//! Session runtime executor

use super::error::TransportError;
use super::traits::{DiagnosticSink, EventSource, RenderTarget};
use super::SessionSnapshot;
use crate::intervention::HumanResponse;
use crate::protocol::{decode_frame, RawFrame, StreamEvent, StreamRequest};
use crate::state_machine::{
    transition, ConvContext, ConvState, Effect, Event, IgnoreReason, ThreadId, TransitionError,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TRANSPORT_CHANNEL_CAPACITY: usize = 64;

/// Requests from a [`super::SessionHandle`]
#[derive(Debug)]
pub(super) enum Command {
    StartTurn {
        thread: ThreadId,
        text: String,
        reply: oneshot::Sender<Result<(), TransitionError>>,
    },
    HumanResponse {
        thread: ThreadId,
        response: HumanResponse,
        reply: oneshot::Sender<Result<(), TransitionError>>,
    },
    Reset {
        reply: oneshot::Sender<ThreadId>,
    },
}

/// Output of a transport task, tagged with its generation
#[derive(Debug)]
enum TransportMessage {
    Frame { generation: u64, frame: RawFrame },
    Failed { generation: u64, error: TransportError },
    Ended { generation: u64 },
}

impl TransportMessage {
    fn generation(&self) -> u64 {
        match self {
            TransportMessage::Frame { generation, .. }
            | TransportMessage::Failed { generation, .. }
            | TransportMessage::Ended { generation } => *generation,
        }
    }
}

struct ActiveTransport {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the session state and executes effects. All mutation happens on the
/// task running [`SessionRuntime::run`].
pub struct SessionRuntime<E, R, D>
where
    E: EventSource + 'static,
    R: RenderTarget,
    D: DiagnosticSink,
{
    context: ConvContext,
    state: ConvState,
    source: Arc<E>,
    render: R,
    diagnostics: D,
    command_rx: mpsc::Receiver<Command>,
    transport_tx: mpsc::Sender<TransportMessage>,
    transport_rx: mpsc::Receiver<TransportMessage>,
    transport: Option<ActiveTransport>,
    /// Render handles of the current turn's segments, by segment index
    placeholders: Vec<R::Handle>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<E, R, D> SessionRuntime<E, R, D>
where
    E: EventSource + 'static,
    R: RenderTarget,
    D: DiagnosticSink,
{
    pub(super) fn new(
        context: ConvContext,
        thread_id: ThreadId,
        source: E,
        render: R,
        diagnostics: D,
        command_rx: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        Self {
            context,
            state: ConvState::new(thread_id),
            source: Arc::new(source),
            render,
            diagnostics,
            command_rx,
            transport_tx,
            transport_rx,
            transport: None,
            placeholders: Vec::new(),
            snapshot_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(thread_id = %self.state.thread_id, "Starting session runtime");
        self.render.set_status(&self.state.session);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = self.transport_rx.recv() => {
                    self.handle_transport(message);
                }
            }
        }

        self.close_transport();
        tracing::info!(thread_id = %self.state.thread_id, "Session runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartTurn {
                thread,
                text,
                reply,
            } => {
                let result = self.dispatch(Event::UserMessage { thread, text });
                let _ = reply.send(result);
            }
            Command::HumanResponse {
                thread,
                response,
                reply,
            } => {
                tracing::info!(response = ?response, "Submitting human response");
                let result = self.dispatch(Event::HumanResponse { thread, response });
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                let new_thread = loop {
                    let candidate = ThreadId::generate();
                    if candidate != self.state.thread_id {
                        break candidate;
                    }
                };
                tracing::info!(
                    old_thread = %self.state.thread_id,
                    new_thread = %new_thread,
                    "Resetting conversation"
                );
                match self.dispatch(Event::Reset {
                    new_thread: new_thread.clone(),
                }) {
                    Ok(()) => {
                        let _ = reply.send(new_thread);
                    }
                    Err(e) => tracing::error!(error = %e, "Reset rejected"),
                }
            }
        }
    }

    fn handle_transport(&mut self, message: TransportMessage) {
        let generation = message.generation();
        if generation != self.state.generation {
            tracing::debug!(
                generation,
                current = self.state.generation,
                "Discarding message from superseded transport"
            );
            return;
        }
        // Frames the backend sent after `end` or `intervention_required` were
        // already queued when the turn closed the transport
        if !self
            .transport
            .as_ref()
            .is_some_and(|t| t.generation == generation)
        {
            tracing::debug!(generation, "Discarding message from closed transport");
            return;
        }

        let event = match message {
            TransportMessage::Frame { generation, frame } => match decode_frame(&frame) {
                Ok(event) => {
                    log_stream_event(generation, &event);
                    Event::Frame { generation, event }
                }
                Err(error) => {
                    self.diagnostics.report_decode_error(&frame, &error);
                    return;
                }
            },
            TransportMessage::Failed { generation, error } => {
                tracing::error!(generation, error = %error, "Transport failed");
                Event::TransportFailed {
                    generation,
                    message: error.to_string(),
                }
            }
            TransportMessage::Ended { generation } => {
                tracing::debug!(generation, "Transport closed by server");
                Event::TransportEnded { generation }
            }
        };

        if let Err(e) = self.dispatch(event) {
            tracing::error!(error = %e, "Transport event rejected");
        }
    }

    /// Run one transition and execute its effects
    fn dispatch(&mut self, event: Event) -> Result<(), TransitionError> {
        let result = match transition(&self.state, &self.context, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(error = %e, state = self.state.session.name(), "Rejected");
                return Err(e);
            }
        };

        match result.ignored {
            Some(IgnoreReason::ProtocolViolation) => {
                tracing::warn!(
                    state = self.state.session.name(),
                    generation = self.state.generation,
                    "Ignoring event not valid for the current turn"
                );
                return Ok(());
            }
            Some(reason) => {
                tracing::debug!(?reason, state = self.state.session.name(), "Event ignored");
                return Ok(());
            }
            None => {}
        }

        let previous = std::mem::replace(&mut self.state, result.new_state);
        if previous.session.name() != self.state.session.name() {
            tracing::info!(
                from = previous.session.name(),
                to = self.state.session.name(),
                thread_id = %self.state.thread_id,
                "Session state changed"
            );
        }

        for effect in result.effects {
            self.execute_effect(effect);
        }
        self.publish_snapshot();
        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RecordUserEntry { text } => self.render.append_user_entry(&text),

            Effect::OpenTransport {
                generation,
                request,
            } => self.open_transport(generation, request),

            Effect::CloseTransport { generation } => {
                if self
                    .transport
                    .as_ref()
                    .is_some_and(|t| t.generation == generation)
                {
                    self.close_transport();
                }
            }

            Effect::CreatePlaceholder { segment } => {
                if segment == self.placeholders.len() {
                    let handle = self.render.create_response_placeholder();
                    self.placeholders.push(handle);
                } else {
                    tracing::warn!(
                        segment,
                        existing = self.placeholders.len(),
                        "Placeholder requested out of order"
                    );
                }
            }

            Effect::RenderSegment { segment, text } => {
                if let Some(handle) = self.placeholders.get(segment) {
                    self.render.render_segment(handle, &text);
                }
            }

            Effect::AppendNotification {
                segment,
                notification,
            } => {
                if let Some(handle) = self.placeholders.get(segment) {
                    self.render.append_notification(handle, &notification);
                }
            }

            Effect::RenderError { segment, message } => match self.placeholders.get(segment) {
                Some(handle) => self.render.render_error(handle, &message),
                None => self.render.append_failure(&message),
            },

            Effect::ShowFailure { message } => self.render.append_failure(&message),

            Effect::PromptHuman { prompt } => self.render.show_intervention(&prompt),

            Effect::ClearPrompt => self.render.clear_intervention(),

            Effect::NotifyState { state } => self.render.set_status(&state),
        }
    }

    fn open_transport(&mut self, generation: u64, request: StreamRequest) {
        self.close_transport();
        self.placeholders.clear();

        tracing::info!(
            generation,
            endpoint = %request.endpoint,
            thread_id = %self.state.thread_id,
            "Opening event stream"
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            Arc::clone(&self.source),
            request,
            generation,
            cancel.clone(),
            self.transport_tx.clone(),
        ));
        self.transport = Some(ActiveTransport {
            generation,
            cancel,
            task,
        });
    }

    fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            tracing::debug!(generation = transport.generation, "Closing event stream");
            transport.cancel.cancel();
            // The task exits at its next await point; it is not joined
            drop(transport.task);
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = SessionSnapshot {
            thread_id: self.state.thread_id.clone(),
            state: self.state.session.clone(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

fn log_stream_event(generation: u64, event: &StreamEvent) {
    match event {
        StreamEvent::ToolCall { name, .. } => {
            tracing::info!(generation, tool = %name, "Agent called a tool");
        }
        StreamEvent::InterventionRequired { question, .. } => {
            tracing::info!(generation, question = %question, "Agent requested human input");
        }
        StreamEvent::End {
            metadata: Some(summary),
        } => {
            tracing::info!(
                generation,
                total_chunks = ?summary.total_chunks,
                total_length = ?summary.total_length,
                "Stream completed"
            );
        }
        StreamEvent::Error { message } => {
            tracing::warn!(generation, error = %message, "Agent reported an error");
        }
        StreamEvent::Unknown => {
            tracing::debug!(generation, "Ignoring unknown event type");
        }
        other => tracing::trace!(generation, kind = other.kind(), "Stream event"),
    }
}

/// Forward one transport's frames to the runtime until it ends or is cancelled
async fn pump<E: EventSource + ?Sized>(
    source: Arc<E>,
    request: StreamRequest,
    generation: u64,
    cancel: CancellationToken,
    tx: mpsc::Sender<TransportMessage>,
) {
    let opened = tokio::select! {
        () = cancel.cancelled() => return,
        opened = source.open_event_stream(&request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(error) => {
            let _ = tx.send(TransportMessage::Failed { generation, error }).await;
            return;
        }
    };

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return,
            next = stream.next() => next,
        };

        let (message, done) = match next {
            Some(Ok(frame)) => (TransportMessage::Frame { generation, frame }, false),
            Some(Err(error)) => (TransportMessage::Failed { generation, error }, true),
            None => (TransportMessage::Ended { generation }, true),
        };

        if tx.send(message).await.is_err() || done {
            return;
        }
    }
}
