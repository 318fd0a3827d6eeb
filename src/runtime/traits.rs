//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use super::error::TransportError;
use crate::protocol::{DecodeError, InterventionPrompt, Notification, RawFrame, StreamRequest};
use crate::state_machine::SessionState;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt::Debug;
use std::sync::Arc;

/// Frames of one open transport, in arrival order. Ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<RawFrame, TransportError>>;

/// Opens server-push event streams
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a stream for `request`. Dropping the returned stream closes it.
    async fn open_event_stream(&self, request: &StreamRequest)
        -> Result<FrameStream, TransportError>;
}

/// Where the conversation is displayed
///
/// Each response segment gets its own placeholder; `render_segment` always
/// receives the segment's full accumulated text.
pub trait RenderTarget: Send + Sync {
    type Handle: Clone + Send + Sync + Debug + 'static;

    fn create_response_placeholder(&self) -> Self::Handle;

    /// Replace the placeholder's content with `text`
    fn render_segment(&self, handle: &Self::Handle, text: &str);

    fn append_notification(&self, handle: &Self::Handle, notification: &Notification);

    /// Show a failure inside the placeholder
    fn render_error(&self, handle: &Self::Handle, message: &str);

    fn append_user_entry(&self, text: &str);

    /// Show a failure for a turn that produced no placeholder
    fn append_failure(&self, message: &str);

    fn show_intervention(&self, prompt: &InterventionPrompt);

    fn clear_intervention(&self);

    fn set_status(&self, state: &SessionState);
}

/// Receives frames that could not be decoded
pub trait DiagnosticSink: Send + Sync {
    fn report_decode_error(&self, frame: &RawFrame, error: &DecodeError);
}

/// Default sink: decode errors go to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report_decode_error(&self, frame: &RawFrame, error: &DecodeError) {
        tracing::warn!(error = %error, data = %frame.data, "Skipping undecodable frame");
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn open_event_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<FrameStream, TransportError> {
        (**self).open_event_stream(request).await
    }
}

impl<T: RenderTarget + ?Sized> RenderTarget for Arc<T> {
    type Handle = T::Handle;

    fn create_response_placeholder(&self) -> Self::Handle {
        (**self).create_response_placeholder()
    }

    fn render_segment(&self, handle: &Self::Handle, text: &str) {
        (**self).render_segment(handle, text);
    }

    fn append_notification(&self, handle: &Self::Handle, notification: &Notification) {
        (**self).append_notification(handle, notification);
    }

    fn render_error(&self, handle: &Self::Handle, message: &str) {
        (**self).render_error(handle, message);
    }

    fn append_user_entry(&self, text: &str) {
        (**self).append_user_entry(text);
    }

    fn append_failure(&self, message: &str) {
        (**self).append_failure(message);
    }

    fn show_intervention(&self, prompt: &InterventionPrompt) {
        (**self).show_intervention(prompt);
    }

    fn clear_intervention(&self) {
        (**self).clear_intervention();
    }

    fn set_status(&self, state: &SessionState) {
        (**self).set_status(state);
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn report_decode_error(&self, frame: &RawFrame, error: &DecodeError) {
        (**self).report_decode_error(frame, error);
    }
}
