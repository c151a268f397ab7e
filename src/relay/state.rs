//! Session close reasons

use std::fmt;

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Backend reached end of stream
    BackendClosed,
    /// Read or write on the backend failed
    BackendError,
    /// Frontend reached end of stream
    FrontendClosed,
    /// Read or write on the frontend failed
    FrontendError,
    /// No transfer within the idle timeout
    IdleTimeout,
    /// Explicit close request
    Requested,
    /// A forwarding task panicked
    TaskFailed,
}

impl CloseReason {
    /// Whether the session ended because of an error
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CloseReason::BackendError | CloseReason::FrontendError | CloseReason::TaskFailed
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::BackendClosed => "backend closed",
            CloseReason::BackendError => "backend error",
            CloseReason::FrontendClosed => "frontend closed",
            CloseReason::FrontendError => "frontend error",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Requested => "close requested",
            CloseReason::TaskFailed => "task failed",
        };
        f.write_str(s)
    }
}
