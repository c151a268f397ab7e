//! Relay session handle

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::recording::RecordingSink;
use crate::registry::{Guest, GuestInfo};
use crate::stats::StatsSnapshot;
use crate::timer::TimerState;

use super::config::RelayConfig;
use super::forward::{backend_to_frontend, frontend_to_backend};
use super::guests::admit_guests;
use super::shared::{BoxReader, BoxWriter, OnPanic, Shared};
use super::state::CloseReason;

/// A relayed session between a backend and a frontend
///
/// Construction opens the transcript (when recording), starts admitting
/// guests and arms the idle deadline. [`Relay::start`] begins forwarding.
/// The session ends through [`Relay::close`], a transfer failure on either
/// side, or the idle deadline; all of them run the same teardown once.
///
/// # Example
/// ```no_run
/// use session_relay::{Relay, RelayConfig};
/// use tokio::net::TcpStream;
/// use tokio::sync::mpsc;
///
/// # async fn example(frontend: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
/// let backend = TcpStream::connect("10.0.0.5:22").await?;
/// let (_guest_tx, guest_rx) = mpsc::channel(16);
///
/// let relay = Relay::new("abc123", true, backend, frontend, guest_rx, RelayConfig::default()).await?;
/// relay.start();
/// relay.closed().await;
/// # Ok(())
/// # }
/// ```
pub struct Relay {
    shared: Arc<Shared>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Relay {
    /// Create a session.
    ///
    /// Fails with [`RelayError::Construction`](crate::RelayError::Construction)
    /// if recording is requested and the transcript cannot be opened.
    pub async fn new<B, F>(
        session_id: impl Into<String>,
        record: bool,
        backend: B,
        frontend: F,
        guests: mpsc::Receiver<Guest>,
        config: RelayConfig,
    ) -> Result<Self>
    where
        B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        F: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let session_id = session_id.into();

        let recording = if record {
            Some(RecordingSink::open(&config.recording_dir(), &session_id).await?)
        } else {
            None
        };

        let (backend_rx, backend_tx) = split(backend);
        let (frontend_rx, frontend_tx) = split(frontend);

        let shared = Arc::new(Shared::new(
            session_id,
            config,
            recording,
            (Box::new(backend_rx) as BoxReader, Box::new(backend_tx) as BoxWriter),
            (Box::new(frontend_rx) as BoxReader, Box::new(frontend_tx) as BoxWriter),
        ));

        let weak = Arc::downgrade(&shared);
        let timer_task = shared.timer.spawn(move || async move {
            if let Some(shared) = weak.upgrade() {
                tracing::debug!(session_id = %shared.session_id, "Timeout after no interaction");
                let _ = shared.teardown(CloseReason::IdleTimeout).await;
            }
        });

        let admission = shared.spawn_task(
            "guest-admission",
            OnPanic::Log,
            admit_guests(Arc::clone(&shared), guests),
        );

        tracing::info!(
            session_id = %shared.session_id,
            recording = shared.recording_enabled,
            idle_timeout_ms = shared.config.idle_timeout.as_millis() as u64,
            "Session created"
        );

        Ok(Self {
            shared,
            started: AtomicBool::new(false),
            tasks: Mutex::new(vec![timer_task, admission]),
        })
    }

    /// Spawn the two forwarding tasks. Later calls are ignored.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!(session_id = %self.shared.session_id, "Relay already started");
            return;
        }

        let Some((backend_rx, frontend_rx)) = self.shared.take_readers() else {
            tracing::debug!(session_id = %self.shared.session_id, "Relay closed before start");
            return;
        };

        let backend = self.shared.spawn_task(
            "backend->frontend",
            OnPanic::Teardown,
            backend_to_frontend(Arc::clone(&self.shared), backend_rx),
        );
        let frontend = self.shared.spawn_task(
            "frontend->backend",
            OnPanic::Teardown,
            frontend_to_backend(Arc::clone(&self.shared), frontend_rx),
        );

        self.lock_tasks().extend([backend, frontend]);
        tracing::debug!(session_id = %self.shared.session_id, "Relay started");
    }

    /// Tear the session down. Idempotent; returns the first teardown error.
    pub async fn close(&self) -> Result<()> {
        self.shared.teardown(CloseReason::Requested).await
    }

    /// Wait until the session has been torn down and its tasks have exited
    pub async fn closed(&self) {
        let mut finished = self.shared.finished_signal();
        let _ = finished.wait_for(|done| *done).await;

        let tasks: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Session identifier
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Whether teardown has started
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Why the session ended, once it has
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason()
    }

    /// Transcript location when recording
    pub fn transcript_path(&self) -> Option<&Path> {
        self.shared.transcript_path.as_deref()
    }

    /// State of the idle deadline
    pub fn timer_state(&self) -> TimerState {
        self.shared.timer.state()
    }

    /// Number of live guests
    pub async fn guest_count(&self) -> usize {
        self.shared.registry.guest_count().await
    }

    /// Live guests
    pub async fn guests(&self) -> Vec<GuestInfo> {
        self.shared.registry.guests().await
    }

    /// Every guest that joined this session, including departed ones
    pub fn roster(&self) -> Vec<GuestInfo> {
        self.shared.registry.roster()
    }

    /// Transfer statistics
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Configuration in effect
    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("session_id", &self.shared.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
