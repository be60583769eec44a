use shared::{
    domain::{StoryId, ValidationError},
    error::ApiError,
};
use thiserror::Error;

use crate::session::{Operation, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response was received.
    Transport,
    /// The backend answered with a non-success status.
    Backend,
    /// Success status, unparsable body.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("backend unreachable: {message}")]
    Transport { message: String },
    #[error("backend returned status {status}: {}", .error.message)]
    Backend { status: u16, error: ApiError },
    #[error("malformed backend response: {message}")]
    Decode { message: String },
}

impl RequestError {
    pub fn transport(message: impl Into<String>) -> Self {
        RequestError::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        RequestError::Decode {
            message: message.into(),
        }
    }

    pub fn backend(status: u16, body: &str) -> Self {
        RequestError::Backend {
            status,
            error: ApiError::from_response(status, body),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RequestError::Transport { .. } => FailureKind::Transport,
            RequestError::Backend { .. } => FailureKind::Backend,
            RequestError::Decode { .. } => FailureKind::Decode,
        }
    }

    /// Only transport failures are safe to resend unchanged; a backend
    /// rejection will most likely be rejected again.
    pub fn is_retry_safe(&self) -> bool {
        self.kind() == FailureKind::Transport
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RequestError::decode(err.to_string())
        } else {
            RequestError::transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid story parameters: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("operation in progress ({phase:?}); wait for it to finish")]
    OperationInProgress { phase: Phase },
    #[error("cannot {operation} while session is {phase:?}")]
    InvalidPhase { operation: Operation, phase: Phase },
    #[error("continuation text must not be empty")]
    EmptyInput,
    #[error("session has been closed")]
    Closed,
}

impl SessionError {
    /// True when the call was turned away before anything was dispatched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::OperationInProgress { .. }
                | SessionError::InvalidPhase { .. }
                | SessionError::EmptyInput
                | SessionError::Closed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("story {0} not found")]
    NotFound(StoryId),
}
