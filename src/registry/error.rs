//! Guest error types
//!
//! Reasons a guest leaves the registry. None of them affect the session.

use thiserror::Error;

/// Why a guest was removed from the registry
#[derive(Error, Debug)]
pub enum GuestError {
    /// The guest closed its connection
    #[error("disconnected")]
    Disconnected,

    /// Reading a message from the guest failed
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Delivering a broadcast message to the guest failed
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// The guest fell too far behind the broadcast
    #[error("lagged behind by {0} chunks")]
    Lagged(u64),
}
