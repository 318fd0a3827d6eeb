//! Runtime error types

use crate::state_machine::TransitionError;
use thiserror::Error;

/// Connection-level failure of one transport. Terminal for the turn it serves.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            TransportError::Connect(error.to_string())
        } else if let Some(status) = error.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

/// Failure of a call on a session handle
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("session runtime has stopped")]
    Stopped,
}

impl SessionError {
    /// The transition rejection, if that is what this is
    pub fn rejection(&self) -> Option<&TransitionError> {
        match self {
            SessionError::Rejected(e) => Some(e),
            SessionError::Stopped => None,
        }
    }
}
