//! Guest entry types
//!
//! This module defines the per-guest state stored in the registry.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::guest::{GuestId, GuestSink};

/// Descriptive information about an admitted guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestInfo {
    /// Per-session guest ID
    pub id: GuestId,
    /// Identity supplied by the acceptance layer, if any
    pub identity: Option<String>,
    /// When the guest was admitted
    pub joined_at: Instant,
}

/// Shared outbound half of a guest connection.
///
/// The guest's own task writes broadcast chunks through it; teardown closes
/// it. Once closed, further sends fail with `NotConnected`.
#[derive(Clone)]
pub struct GuestOutbound {
    sink: Arc<Mutex<Option<GuestSink>>>,
}

impl GuestOutbound {
    pub(super) fn new(sink: GuestSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
        }
    }

    /// Deliver one binary message
    pub async fn send(&self, chunk: Bytes) -> io::Result<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send(chunk).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "guest connection closed",
            )),
        }
    }

    /// Close the connection. Closing twice is a no-op.
    pub async fn close(&self) -> io::Result<()> {
        let sink = self.sink.lock().await.take();
        match sink {
            Some(mut sink) => sink.close().await,
            None => Ok(()),
        }
    }
}

/// Entry for a single guest in the registry
pub(super) struct GuestEntry {
    pub info: GuestInfo,
    pub outbound: GuestOutbound,
    /// The guest's relay task, once spawned
    pub task: Option<JoinHandle<()>>,
}
