//! Runtime for executing a session
//!
//! A session runs on its own task. Callers talk to it through a cloneable
//! [`SessionHandle`] and observe it through a watch channel of
//! [`SessionSnapshot`]s.

mod error;
mod executor;
pub mod http;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use error::{SessionError, TransportError};
pub use executor::SessionRuntime;
pub use http::HttpEventSource;
pub use traits::*;

use crate::intervention::HumanResponse;
use crate::state_machine::{ConvContext, SessionState, ThreadId};
use executor::Command;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub thread_id: ThreadId,
    pub state: SessionState,
}

/// Handle to interact with a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Thread of the current conversation
    pub fn thread_id(&self) -> ThreadId {
        self.snapshot_rx.borrow().thread_id.clone()
    }

    /// Start a turn from user input. Rejected unless the session is idle.
    pub async fn start_turn(
        &self,
        thread: &ThreadId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartTurn {
            thread: thread.clone(),
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Stopped)??;
        Ok(())
    }

    /// Answer a suspended turn. Rejected unless the session awaits a human.
    pub async fn submit_human_response(
        &self,
        thread: &ThreadId,
        response: HumanResponse,
    ) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::HumanResponse {
            thread: thread.clone(),
            response,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Stopped)??;
        Ok(())
    }

    /// Abandon the conversation and start a new thread. Returns the new id.
    pub async fn reset(&self) -> Result<ThreadId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Receive every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Status changes as a stream, starting with the current snapshot
    pub fn updates(&self) -> WatchStream<SessionSnapshot> {
        WatchStream::new(self.snapshot_rx.clone())
    }

    /// Wait until no turn is streaming
    pub async fn wait_until_settled(&self) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| s.state != SessionState::Streaming)
            .await
            .map_err(|_| SessionError::Stopped)?;
        Ok(snapshot.clone())
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }
}

/// Create a runtime for a fresh thread and its handle. The runtime does
/// nothing until [`SessionRuntime::run`] is awaited.
pub fn create_session<E, R, D>(
    context: ConvContext,
    source: E,
    render: R,
    diagnostics: D,
) -> (SessionRuntime<E, R, D>, SessionHandle)
where
    E: EventSource + 'static,
    R: RenderTarget,
    D: DiagnosticSink,
{
    let thread_id = ThreadId::generate();
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
        thread_id: thread_id.clone(),
        state: SessionState::Idle,
    });
    let runtime = SessionRuntime::new(
        context,
        thread_id,
        source,
        render,
        diagnostics,
        command_rx,
        snapshot_tx,
    );
    (
        runtime,
        SessionHandle {
            command_tx,
            snapshot_rx,
        },
    )
}

/// Spawn a session on the current tokio runtime
pub fn spawn_session<E, R, D>(
    context: ConvContext,
    source: E,
    render: R,
    diagnostics: D,
) -> (SessionHandle, JoinHandle<()>)
where
    E: EventSource + 'static,
    R: RenderTarget + 'static,
    D: DiagnosticSink + 'static,
{
    let (runtime, handle) = create_session(context, source, render, diagnostics);
    let task = tokio::spawn(runtime.run());
    (handle, task)
}
