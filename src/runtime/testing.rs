//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::error::TransportError;
use super::traits::*;
use crate::protocol::{DecodeError, InterventionPrompt, Notification, RawFrame, StreamRequest};
use crate::state_machine::SessionState;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

// ============================================================================
// Scripted Event Source
// ============================================================================

/// What the next opened stream does
pub enum Script {
    /// Deliver these items, then end
    Frames(Vec<Result<RawFrame, TransportError>>),
    /// Deliver whatever the test sends; ends when the sender is dropped
    Live(mpsc::UnboundedReceiver<Result<RawFrame, TransportError>>),
    /// Fail to open
    Refuse(TransportError),
}

/// Event source that replays queued scripts, one per opened stream
pub struct ScriptedEventSource {
    scripts: Mutex<VecDeque<Script>>,
    /// Record of every stream request
    pub requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedEventSource {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a stream delivering `frames` (raw JSON payloads), then ending
    pub fn queue_frames(&self, frames: &[&str]) {
        let frames = frames.iter().map(|f| Ok(RawFrame::new(*f))).collect();
        self.queue(Script::Frames(frames));
    }

    /// Queue a stream that delivers `frames` and then fails
    pub fn queue_frames_then_error(&self, frames: &[&str], error: TransportError) {
        let mut items: Vec<_> = frames.iter().map(|f| Ok(RawFrame::new(*f))).collect();
        items.push(Err(error));
        self.queue(Script::Frames(items));
    }

    /// Queue a stream the test drives by hand
    pub fn queue_live(&self) -> mpsc::UnboundedSender<Result<RawFrame, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue(Script::Live(rx));
        tx
    }

    pub fn queue_refusal(&self, error: TransportError) {
        self.queue(Script::Refuse(error));
    }

    pub fn queue(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn recorded_requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for ScriptedEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn open_event_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<FrameStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Frames(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(Script::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(Script::Refuse(error)) => Err(error),
            None => Err(TransportError::Connect("no scripted stream".to_string())),
        }
    }
}

// ============================================================================
// Recording Renderer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Placeholder(usize),
    Segment { handle: usize, text: String },
    Notification { handle: usize, kind: &'static str },
    Error { handle: usize, message: String },
    UserEntry(String),
    Failure(String),
    Intervention(InterventionPrompt),
    ClearIntervention,
    Status(&'static str),
}

/// Renderer that records every call; handles are sequential integers
#[derive(Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
    next_handle: Mutex<usize>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Last rendered text of every placeholder, in creation order
    pub fn segment_texts(&self) -> Vec<String> {
        let mut texts = vec![String::new(); *self.next_handle.lock().unwrap()];
        for call in self.calls() {
            if let RenderCall::Segment { handle, text } = call {
                texts[handle] = text;
            }
        }
        texts
    }

    pub fn failures(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RenderCall::Failure(message) | RenderCall::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RenderCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RenderTarget for RecordingRenderer {
    type Handle = usize;

    fn create_response_placeholder(&self) -> usize {
        let mut next = self.next_handle.lock().unwrap();
        let handle = *next;
        *next += 1;
        self.record(RenderCall::Placeholder(handle));
        handle
    }

    fn render_segment(&self, handle: &usize, text: &str) {
        self.record(RenderCall::Segment {
            handle: *handle,
            text: text.to_string(),
        });
    }

    fn append_notification(&self, handle: &usize, notification: &Notification) {
        self.record(RenderCall::Notification {
            handle: *handle,
            kind: notification.kind(),
        });
    }

    fn render_error(&self, handle: &usize, message: &str) {
        self.record(RenderCall::Error {
            handle: *handle,
            message: message.to_string(),
        });
    }

    fn append_user_entry(&self, text: &str) {
        self.record(RenderCall::UserEntry(text.to_string()));
    }

    fn append_failure(&self, message: &str) {
        self.record(RenderCall::Failure(message.to_string()));
    }

    fn show_intervention(&self, prompt: &InterventionPrompt) {
        self.record(RenderCall::Intervention(prompt.clone()));
    }

    fn clear_intervention(&self) {
        self.record(RenderCall::ClearIntervention);
    }

    fn set_status(&self, state: &SessionState) {
        self.record(RenderCall::Status(state.name()));
    }
}

// ============================================================================
// Recording Diagnostics
// ============================================================================

#[derive(Default)]
pub struct RecordingDiagnostics {
    /// Raw data of every undecodable frame
    pub frames: Mutex<Vec<String>>,
}

impl DiagnosticSink for RecordingDiagnostics {
    fn report_decode_error(&self, frame: &RawFrame, _error: &DecodeError) {
        self.frames.lock().unwrap().push(frame.data.clone());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendMode;
    use crate::intervention::HumanResponse;
    use crate::protocol::ReviewFields;
    use crate::runtime::{spawn_session, SessionError, SessionHandle, SessionSnapshot};
    use crate::state_machine::{ConvContext, ThreadId, TransitionError, FALLBACK_MESSAGE};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    struct TestSession {
        handle: SessionHandle,
        source: Arc<ScriptedEventSource>,
        render: Arc<RecordingRenderer>,
        diagnostics: Arc<RecordingDiagnostics>,
    }

    impl TestSession {
        fn new(mode: BackendMode) -> Self {
            let source = Arc::new(ScriptedEventSource::new());
            let render = Arc::new(RecordingRenderer::new());
            let diagnostics = Arc::new(RecordingDiagnostics::default());
            let (handle, _task) = spawn_session(
                ConvContext::new(mode.endpoints()),
                Arc::clone(&source),
                Arc::clone(&render),
                Arc::clone(&diagnostics),
            );
            Self {
                handle,
                source,
                render,
                diagnostics,
            }
        }

        async fn send(&self, text: &str) -> Result<(), SessionError> {
            self.handle.start_turn(&self.handle.thread_id(), text).await
        }

        async fn respond(&self, response: HumanResponse) -> Result<(), SessionError> {
            self.handle
                .submit_human_response(&self.handle.thread_id(), response)
                .await
        }

        async fn settle(&self) -> SessionSnapshot {
            tokio::time::timeout(WAIT, self.handle.wait_until_settled())
                .await
                .expect("session did not settle")
                .unwrap()
        }

        /// Poll until the renderer satisfies `check`
        async fn until(&self, check: impl Fn(&RecordingRenderer) -> bool) {
            let render = Arc::clone(&self.render);
            tokio::time::timeout(WAIT, async move {
                while !check(&render) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("condition not reached");
        }
    }

    fn frame(json: &str) -> Result<RawFrame, TransportError> {
        Ok(RawFrame::new(json))
    }

    #[tokio::test]
    async fn test_simple_turn_renders_accumulated_text() {
        let session = TestSession::new(BackendMode::Chat);
        session.source.queue_frames(&[
            r#"{"type":"start","content":""}"#,
            r#"{"type":"content","content":"Hi"}"#,
            r#"{"type":"content","content":" there"}"#,
            r#"{"type":"end","metadata":{"total_chunks":2,"total_length":8}}"#,
        ]);

        session.send("hello").await.unwrap();
        let snapshot = session.settle().await;

        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(session.render.segment_texts(), vec!["Hi there".to_string()]);
        let calls = session.render.calls();
        assert!(calls.contains(&RenderCall::UserEntry("hello".to_string())));
        assert!(calls.contains(&RenderCall::Segment {
            handle: 0,
            text: "Hi".to_string()
        }));

        let requests = session.source.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint, "/chat/stream");
        assert_eq!(requests[0].get("message"), Some("hello"));
        assert_eq!(
            requests[0].get("thread_id"),
            Some(snapshot.thread_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_tool_activity_splits_response() {
        let session = TestSession::new(BackendMode::Tool);
        session.source.queue_frames(&[
            r#"{"type":"content","content":"Let me check."}"#,
            r#"{"type":"tool_call","tool_name":"lookup","tool_args":{"q":"x"}}"#,
            r#"{"type":"tool_running","content":"running lookup"}"#,
            r#"{"type":"tool_result","result":"42"}"#,
            r#"{"type":"content","content":"The answer is "}"#,
            r#"{"type":"content","content":"42."}"#,
            r#"{"type":"end"}"#,
        ]);

        session.send("what is it?").await.unwrap();
        session.settle().await;

        assert_eq!(
            session.render.segment_texts(),
            vec!["Let me check.".to_string(), "The answer is 42.".to_string()]
        );
        let notifications: Vec<_> = session
            .render
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RenderCall::Notification { .. }))
            .collect();
        assert_eq!(
            notifications,
            vec![
                RenderCall::Notification {
                    handle: 0,
                    kind: "tool_call"
                },
                RenderCall::Notification {
                    handle: 0,
                    kind: "tool_running"
                },
                RenderCall::Notification {
                    handle: 0,
                    kind: "tool_result"
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_confirmation_resumes_with_flag_only() {
        let session = TestSession::new(BackendMode::CustomizeState);
        session.source.queue_frames(&[
            r#"{"type":"content","content":"I found LangGraph."}"#,
            r#"{"type":"intervention_required","question":"Is this correct?","name":"LangGraph","birthday":"2024-01-17"}"#,
            r#"{"type":"end"}"#,
        ]);
        session.source.queue_frames(&[
            r#"{"type":"content","content":"Saved."}"#,
            r#"{"type":"end"}"#,
        ]);

        session.send("When was LangGraph released?").await.unwrap();
        let snapshot = session.settle().await;
        let SessionState::AwaitingHuman { prompt } = snapshot.state else {
            panic!("expected suspension, got {:?}", snapshot.state);
        };
        assert_eq!(prompt.question, "Is this correct?");
        assert!(prompt.is_review());

        session.respond(HumanResponse::Confirm).await.unwrap();
        let snapshot = session.settle().await;
        assert_eq!(snapshot.state, SessionState::Idle);

        let requests = session.source.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].endpoint, "/customize-state/respond/stream");
        assert_eq!(
            requests[1].params,
            vec![
                ("correct".to_string(), "y".to_string()),
                ("thread_id".to_string(), snapshot.thread_id.to_string()),
            ]
        );

        // Earlier output is kept; the resumed turn renders into a new placeholder
        assert_eq!(
            session.render.segment_texts(),
            vec!["I found LangGraph.".to_string(), "Saved.".to_string()]
        );
        assert!(session
            .render
            .calls()
            .contains(&RenderCall::ClearIntervention));
    }

    #[tokio::test]
    async fn test_correction_sends_only_present_fields() {
        let session = TestSession::new(BackendMode::CustomizeState);
        session.source.queue_frames(&[
            r#"{"type":"intervention_required","question":"Is this correct?","name":"LangGraph","birthday":"2024-01-17"}"#,
        ]);
        session
            .source
            .queue_frames(&[r#"{"type":"content","content":"Updated."}"#, r#"{"type":"end"}"#]);

        session.send("lookup").await.unwrap();
        session.settle().await;

        session
            .respond(HumanResponse::correct(ReviewFields {
                name: None,
                birthday: Some("2023-01-17".to_string()),
            }))
            .await
            .unwrap();
        session.settle().await;

        let requests = session.source.recorded_requests();
        assert_eq!(requests[1].get("birthday"), Some("2023-01-17"));
        assert_eq!(requests[1].get("name"), None);
        assert_eq!(requests[1].get("correct"), None);
    }

    #[tokio::test]
    async fn test_recursive_intervention() {
        let session = TestSession::new(BackendMode::HumanLoop);
        session
            .source
            .queue_frames(&[r#"{"type":"intervention_required","query":"Which city?"}"#]);
        session
            .source
            .queue_frames(&[r#"{"type":"intervention_required","query":"Which year?"}"#]);
        session
            .source
            .queue_frames(&[r#"{"type":"content","content":"Paris, 1900."}"#, r#"{"type":"end"}"#]);

        session.send("plan a trip").await.unwrap();
        session.settle().await;
        session.respond(HumanResponse::guidance("Paris")).await.unwrap();

        let snapshot = session.settle().await;
        let SessionState::AwaitingHuman { prompt } = snapshot.state else {
            panic!("expected second suspension");
        };
        assert_eq!(prompt.question, "Which year?");
        assert!(!prompt.is_review());

        session.respond(HumanResponse::guidance("1900")).await.unwrap();
        assert_eq!(session.settle().await.state, SessionState::Idle);

        let requests = session.source.recorded_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].endpoint, "/human-loop/respond/stream");
        assert_eq!(requests[1].get("response"), Some("Paris"));
        assert_eq!(requests[2].get("response"), Some("1900"));
        assert!(requests
            .iter()
            .all(|r| r.get("thread_id") == Some(snapshot.thread_id.as_str())));
    }

    #[tokio::test]
    async fn test_second_message_rejected_while_streaming() {
        let session = TestSession::new(BackendMode::Chat);
        let tx = session.source.queue_live();

        session.send("first").await.unwrap();
        let err = session.send("second").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&TransitionError::AgentBusy));

        tx.send(frame(r#"{"type":"content","content":"ok"}"#)).unwrap();
        tx.send(frame(r#"{"type":"end"}"#)).unwrap();
        session.settle().await;

        // Only the first message reached the backend
        assert_eq!(session.source.recorded_requests().len(), 1);
        assert!(!session
            .render
            .calls()
            .contains(&RenderCall::UserEntry("second".to_string())));
    }

    #[tokio::test]
    async fn test_message_rejected_while_awaiting_human() {
        let session = TestSession::new(BackendMode::HumanLoop);
        session
            .source
            .queue_frames(&[r#"{"type":"intervention_required","question":"Help?"}"#]);

        session.send("start").await.unwrap();
        session.settle().await;

        let err = session.send("something else").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&TransitionError::AwaitingHuman));
    }

    #[tokio::test]
    async fn test_decode_error_does_not_end_stream() {
        let session = TestSession::new(BackendMode::Chat);
        session.source.queue_frames(&[
            r#"{"type":"content","content":"A"}"#,
            "{not json",
            r#"{"type":"content"}"#,
            r#"{"type":"heartbeat"}"#,
            r#"{"type":"content","content":"B"}"#,
            r#"{"type":"end"}"#,
        ]);

        session.send("go").await.unwrap();
        assert_eq!(session.settle().await.state, SessionState::Idle);

        assert_eq!(session.render.segment_texts(), vec!["AB".to_string()]);
        let bad = session.diagnostics.frames.lock().unwrap().clone();
        assert_eq!(bad, vec!["{not json".to_string(), r#"{"type":"content"}"#.to_string()]);
        assert!(session.render.failures().is_empty());
    }

    #[tokio::test]
    async fn test_refused_connection_shows_fallback() {
        let session = TestSession::new(BackendMode::Chat);
        session
            .source
            .queue_refusal(TransportError::Connect("connection refused".to_string()));

        session.send("hello").await.unwrap();
        assert_eq!(session.settle().await.state, SessionState::Idle);
        assert_eq!(
            session.render.failures(),
            vec![FALLBACK_MESSAGE.to_string()]
        );
    }

    #[tokio::test]
    async fn test_server_error_status_is_transport_failure() {
        let session = TestSession::new(BackendMode::Chat);
        session.source.queue_refusal(TransportError::Status {
            status: 500,
            body: "internal error".to_string(),
        });
        session.source.queue_frames(&[
            r#"{"type":"content","content":"Back."}"#,
            r#"{"type":"end"}"#,
        ]);

        session.send("hello").await.unwrap();
        session.settle().await;
        assert_eq!(session.render.failures().len(), 1);

        // Session is usable again
        session.send("retry").await.unwrap();
        session.settle().await;
        assert_eq!(session.render.segment_texts(), vec!["Back.".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_ending_without_terminal_event_fails_turn() {
        let session = TestSession::new(BackendMode::Chat);
        session
            .source
            .queue_frames(&[r#"{"type":"content","content":"Partial"}"#]);

        session.send("hello").await.unwrap();
        assert_eq!(session.settle().await.state, SessionState::Idle);
        assert!(session.render.calls().iter().any(|c| matches!(
            c,
            RenderCall::Error { handle: 0, .. }
        )));
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_text() {
        let session = TestSession::new(BackendMode::Chat);
        session.source.queue_frames_then_error(
            &[r#"{"type":"content","content":"Half an ans"}"#],
            TransportError::Stream("reset by peer".to_string()),
        );

        session.send("hello").await.unwrap();
        session.settle().await;
        assert_eq!(session.render.segment_texts(), vec!["Half an ans".to_string()]);
        assert_eq!(session.render.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_rendered_in_placeholder() {
        let session = TestSession::new(BackendMode::Chat);
        session.source.queue_frames(&[
            r#"{"type":"content","content":"Working"}"#,
            r#"{"type":"error","error":"model overloaded"}"#,
        ]);

        session.send("hello").await.unwrap();
        assert_eq!(session.settle().await.state, SessionState::Idle);
        assert!(session.render.calls().contains(&RenderCall::Error {
            handle: 0,
            message: "model overloaded".to_string()
        }));
    }

    #[tokio::test]
    async fn test_reset_closes_stream_and_starts_new_thread() {
        let session = TestSession::new(BackendMode::Chat);
        let tx = session.source.queue_live();
        let old_thread = session.handle.thread_id();

        session.send("hello").await.unwrap();
        tx.send(frame(r#"{"type":"content","content":"Hi"}"#)).unwrap();
        session
            .until(|r| r.segment_texts() == vec!["Hi".to_string()])
            .await;

        let new_thread = session.handle.reset().await.unwrap();
        assert_ne!(new_thread, old_thread);
        assert_eq!(session.handle.thread_id(), new_thread);
        assert_eq!(session.handle.snapshot().state, SessionState::Idle);

        // The stream is dropped by the transport task
        tokio::time::timeout(WAIT, tx.closed())
            .await
            .expect("stream was not closed");

        // A message on the old thread is refused; the new thread works
        let err = session
            .handle
            .start_turn(&old_thread, "late")
            .await
            .unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(TransitionError::UnknownThread(_))
        ));

        session
            .source
            .queue_frames(&[r#"{"type":"content","content":"Fresh"}"#, r#"{"type":"end"}"#]);
        session.send("again").await.unwrap();
        session.settle().await;
        assert_eq!(
            session.source.recorded_requests()[1].get("thread_id"),
            Some(new_thread.as_str())
        );
    }

    #[tokio::test]
    async fn test_resumption_unsupported_in_chat_mode() {
        let session = TestSession::new(BackendMode::Chat);
        session
            .source
            .queue_frames(&[r#"{"type":"intervention_required","question":"?"}"#]);

        session.send("hello").await.unwrap();
        session.settle().await;

        let err = session
            .respond(HumanResponse::guidance("anything"))
            .await
            .unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&TransitionError::ResumptionUnsupported)
        );
    }

    #[tokio::test]
    async fn test_frames_after_suspension_are_discarded() {
        let session = TestSession::new(BackendMode::HumanLoop);
        session.source.queue_frames(&[
            r#"{"type":"content","content":"Let me ask."}"#,
            r#"{"type":"intervention_required","query":"Which city?"}"#,
            r#"{"type":"end"}"#,
            "{not json",
            r#"{"type":"content","content":"late"}"#,
        ]);

        session.send("plan a trip").await.unwrap();
        let snapshot = session.settle().await;
        assert!(matches!(snapshot.state, SessionState::AwaitingHuman { .. }));

        // Give the queued tail time to drain through the runtime
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.diagnostics.frames.lock().unwrap().is_empty());
        assert_eq!(
            session.render.segment_texts(),
            vec!["Let me ask.".to_string()]
        );
        assert!(matches!(
            session.handle.snapshot().state,
            SessionState::AwaitingHuman { .. }
        ));
    }

    #[tokio::test]
    async fn test_response_must_match_prompt() {
        let session = TestSession::new(BackendMode::HumanLoop);
        session
            .source
            .queue_frames(&[r#"{"type":"intervention_required","query":"Which city?"}"#]);

        session.send("plan a trip").await.unwrap();
        session.settle().await;

        let err = session.respond(HumanResponse::Confirm).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&TransitionError::AnswerExpected));

        // Still suspended, and no resumption stream was opened
        let snapshot = session.handle.snapshot();
        assert!(matches!(snapshot.state, SessionState::AwaitingHuman { .. }));
        assert_eq!(session.source.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_review_prompt_rejects_free_text() {
        let session = TestSession::new(BackendMode::CustomizeState);
        session.source.queue_frames(&[
            r#"{"type":"intervention_required","question":"Is this correct?","name":"LangGraph","birthday":"2024-01-17"}"#,
        ]);

        session.send("lookup").await.unwrap();
        session.settle().await;

        let err = session
            .respond(HumanResponse::guidance("no, the date is wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&TransitionError::ReviewExpected));
        assert_eq!(session.source.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_status_changes() {
        let session = TestSession::new(BackendMode::Chat);
        let mut rx = session.handle.subscribe();
        session
            .source
            .queue_frames(&[r#"{"type":"content","content":"x"}"#, r#"{"type":"end"}"#]);

        session.send("hello").await.unwrap();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.state == SessionState::Idle))
            .await
            .unwrap()
            .unwrap();

        let statuses: Vec<_> = session
            .render
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                RenderCall::Status(name) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec!["idle", "streaming", "idle"]);
    }

    #[tokio::test]
    async fn test_updates_stream_ends_with_runtime() {
        let session = TestSession::new(BackendMode::HumanLoop);
        session
            .source
            .queue_frames(&[r#"{"type":"intervention_required","question":"Who?"}"#]);
        let updates = session.handle.updates();

        session.send("hello").await.unwrap();
        session.settle().await;
        let TestSession { handle, .. } = session;
        drop(handle);

        let states: Vec<_> = tokio::time::timeout(WAIT, updates.map(|s| s.state.name()).collect())
            .await
            .expect("updates did not end");
        // Intermediate values may be coalesced; the last one is always seen
        assert_eq!(states.last(), Some(&"awaiting_human"));
    }

    #[tokio::test]
    async fn test_runtime_stops_when_handles_dropped() {
        let (handle, task) = spawn_session(
            ConvContext::new(BackendMode::Chat.endpoints()),
            ScriptedEventSource::new(),
            RecordingRenderer::new(),
            TracingDiagnostics,
        );
        let thread: ThreadId = handle.thread_id();
        let observer = handle.subscribe();
        drop(handle);

        tokio::time::timeout(WAIT, task)
            .await
            .expect("runtime did not stop")
            .unwrap();
        assert!(observer.has_changed().is_err());
        assert_eq!(observer.borrow().thread_id, thread);
    }
}
