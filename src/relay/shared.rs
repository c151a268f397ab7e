//! Session state shared between the relay handle and its tasks

use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result, Side};
use crate::recording::RecordingSink;
use crate::registry::{GuestId, GuestRegistry};
use crate::stats::RelayStats;
use crate::timer::IdleTimer;

use super::config::RelayConfig;
use super::state::CloseReason;

/// What to do after a background task panics
#[derive(Debug, Clone, Copy)]
pub(crate) enum OnPanic {
    Log,
    Teardown,
    PruneGuest(GuestId),
}

pub(crate) type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct Shared {
    pub session_id: String,
    pub config: RelayConfig,
    pub recording_enabled: bool,
    pub transcript_path: Option<PathBuf>,

    closed: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    /// Flipped to true when teardown starts; every task watches it
    shutdown: watch::Sender<bool>,
    /// Flipped to true when teardown has finished
    finished: watch::Sender<bool>,

    pub timer: Arc<IdleTimer>,
    pub registry: GuestRegistry,
    pub stats: RelayStats,

    recording: AsyncMutex<Option<RecordingSink>>,
    /// Single write path into the backend, shared by frontend and guest tasks
    backend_tx: AsyncMutex<Option<BoxWriter>>,
    frontend_tx: AsyncMutex<Option<BoxWriter>>,
    /// Read halves parked until forwarding starts
    readers: Mutex<Option<(BoxReader, BoxReader)>>,
}

impl Shared {
    pub fn new(
        session_id: String,
        config: RelayConfig,
        recording: Option<RecordingSink>,
        backend: (BoxReader, BoxWriter),
        frontend: (BoxReader, BoxWriter),
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        let timer = IdleTimer::new(config.idle_timeout);
        let registry = GuestRegistry::new(config.guest_backlog);

        Self {
            session_id,
            recording_enabled: recording.is_some(),
            transcript_path: recording.as_ref().map(|sink| sink.path().to_path_buf()),
            config,
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            shutdown,
            finished,
            timer,
            registry,
            stats: RelayStats::new(),
            recording: AsyncMutex::new(recording),
            backend_tx: AsyncMutex::new(Some(backend.1)),
            frontend_tx: AsyncMutex::new(Some(frontend.1)),
            readers: Mutex::new(Some((backend.0, frontend.0))),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receiver that turns true once teardown starts
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Receiver that turns true once teardown has finished
    pub fn finished_signal(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }

    /// Hand the read halves to the forwarding tasks (once)
    pub fn take_readers(&self) -> Option<(BoxReader, BoxReader)> {
        self.readers.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Append a backend chunk to the transcript. Failures are logged only.
    pub async fn record(&self, chunk: &[u8]) {
        if !self.recording_enabled {
            return;
        }

        let mut recording = self.recording.lock().await;
        if let Some(sink) = recording.as_mut() {
            if let Err(e) = sink.append(chunk).await {
                self.stats.inc_recording_failures();
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "Transcript append failed"
                );
            }
        }
    }

    /// Write to one principal connection.
    ///
    /// Gives up with `ConnectionAborted` as soon as teardown starts, so a
    /// stalled peer cannot hold the writer lock against teardown.
    pub async fn write_to(&self, side: Side, data: &[u8]) -> Result<()> {
        let writer = match side {
            Side::Backend => &self.backend_tx,
            Side::Frontend => &self.frontend_tx,
        };
        let mut shutdown = self.shutdown_signal();

        let result = tokio::select! {
            result = async {
                let mut guard = writer.lock().await;
                match guard.as_mut() {
                    Some(w) => match w.write_all(data).await {
                        Ok(()) => w.flush().await,
                        Err(e) => Err(e),
                    },
                    None => Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed")),
                }
            } => result,
            _ = wait_shutdown(&mut shutdown) => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "session closed"))
            }
        };

        result.map_err(|source| RelayError::Transfer { side, source })
    }

    /// Spawn a background task that survives its own panics.
    ///
    /// A panic is logged and then handled according to `on_panic`.
    pub fn spawn_task<F>(self: &Arc<Self>, task: &'static str, on_panic: OnPanic, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::clone(self);

        tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
                let err = RelayError::Panicked {
                    task,
                    message: panic_message(payload.as_ref()),
                };
                tracing::error!(session_id = %shared.session_id, error = %err, "Background task failed");

                match on_panic {
                    OnPanic::Log => {}
                    OnPanic::Teardown => {
                        let _ = shared.teardown(CloseReason::TaskFailed).await;
                    }
                    OnPanic::PruneGuest(id) => {
                        if shared.registry.unregister(id).await {
                            shared.stats.inc_guests_pruned();
                        }
                    }
                }
            }
        })
    }

    /// Tear the session down exactly once.
    ///
    /// Every step is attempted; the first error is returned. Later calls
    /// return `Ok(())` without doing anything.
    pub async fn teardown(&self, reason: CloseReason) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *self.close_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);

        tracing::info!(session_id = %self.session_id, reason = %reason, "Closing session");

        self.shutdown.send_replace(true);
        self.timer.stop();

        let mut first_err: Option<RelayError> = None;

        if let Some(mut sink) = self.recording.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::error!(session_id = %self.session_id, error = %e, "Failed to close transcript");
                first_err.get_or_insert(e);
            }
        }

        let guests = self.registry.close_all().await;

        for (resource, writer) in [("backend", &self.backend_tx), ("frontend", &self.frontend_tx)] {
            if let Err(source) = shutdown_writer(writer).await {
                let err = RelayError::Shutdown { resource, source };
                tracing::error!(session_id = %self.session_id, error = %err, "Teardown step failed");
                first_err.get_or_insert(err);
            }
        }

        // Forwarding never started; drop the read halves here
        drop(self.take_readers());

        let stats = self.stats.snapshot();
        tracing::info!(
            session_id = %self.session_id,
            reason = %reason,
            guests_closed = guests,
            backend_bytes = stats.backend_to_frontend_bytes,
            frontend_bytes = stats.frontend_to_backend_bytes,
            guest_bytes = stats.guest_to_backend_bytes,
            duration_ms = stats.duration.as_millis() as u64,
            "Session ended"
        );

        self.finished.send_replace(true);

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn shutdown_writer(writer: &AsyncMutex<Option<BoxWriter>>) -> io::Result<()> {
    let taken = writer.lock().await.take();
    match taken {
        Some(mut w) => w.shutdown().await,
        None => Ok(()),
    }
}

/// Resolve once teardown has started.
///
/// The watch guard is released before returning, so this can sit in a
/// `select!` next to branches that hold it across awaits.
pub(crate) async fn wait_shutdown(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closed| *closed).await;
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
