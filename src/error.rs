//! Error types for the session relay

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::{GuestError, GuestId};

/// Principal side of a relayed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The upstream endpoint being proxied
    Backend,
    /// The connected client's endpoint
    Frontend,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Backend => write!(f, "backend"),
            Side::Frontend => write!(f, "frontend"),
        }
    }
}

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Transcript storage could not be prepared or opened
    #[error("Cannot prepare transcript {}: {source}", .path.display())]
    Construction {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read or write failure on a principal connection
    #[error("Transfer failed on {side}: {source}")]
    Transfer {
        side: Side,
        #[source]
        source: std::io::Error,
    },

    /// Transcript append or close failure
    #[error("Recording error: {0}")]
    Recording(#[source] std::io::Error),

    /// Guest read/write failure
    #[error("Guest {id} failed: {reason}")]
    Guest {
        id: GuestId,
        #[source]
        reason: GuestError,
    },

    /// Failure while closing a resource during teardown
    #[error("Failed to close {resource}: {source}")]
    Shutdown {
        resource: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A background task panicked
    #[error("Task {task} panicked: {message}")]
    Panicked { task: &'static str, message: String },
}

impl RelayError {
    /// Whether this error ends the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Construction { .. } | RelayError::Transfer { .. }
        )
    }
}

/// Result type alias for RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
