//! Idle deadline
//!
//! A rearmable single-shot deadline. Every transfer pushes the deadline
//! forward by the configured timeout; if the timeout elapses without a rearm
//! the timer fires once and runs its callback (the relay's teardown).
//!
//! ```text
//!            rearm()
//!           ┌──────┐
//!           ▼      │
//!        [Armed] ──┘ ──── deadline elapsed ───► [Fired]
//!           │
//!           └──────────── stop() ─────────────► [Stopped]
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// State of the idle timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Counting down towards the deadline
    Armed,
    /// Deadline elapsed; teardown was triggered
    Fired,
    /// Stopped by teardown before firing
    Stopped,
}

#[derive(Debug)]
struct Inner {
    state: TimerState,
    deadline: Instant,
}

/// Rearmable idle deadline
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    inner: Mutex<Inner>,
    wake: Notify,
}

impl IdleTimer {
    /// Create an armed timer expiring `timeout` from now
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            inner: Mutex::new(Inner {
                state: TimerState::Armed,
                deadline: Instant::now() + timeout,
            }),
            wake: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current state
    pub fn state(&self) -> TimerState {
        self.lock().state
    }

    /// Current deadline, if still armed
    pub fn deadline(&self) -> Option<Instant> {
        let inner = self.lock();
        (inner.state == TimerState::Armed).then_some(inner.deadline)
    }

    /// Push the deadline to `timeout` from now.
    ///
    /// Returns false (and does nothing) once the timer has fired or stopped.
    pub fn rearm(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != TimerState::Armed {
            return false;
        }
        inner.deadline = Instant::now() + self.timeout;
        true
    }

    /// Stop the timer without firing. Returns true if it was still armed.
    pub fn stop(&self) -> bool {
        let stopped = {
            let mut inner = self.lock();
            if inner.state == TimerState::Armed {
                inner.state = TimerState::Stopped;
                true
            } else {
                false
            }
        };
        if stopped {
            self.wake.notify_one();
        }
        stopped
    }

    /// Spawn the countdown task.
    ///
    /// `on_fire` runs at most once, when the deadline elapses while armed.
    pub fn spawn<F, Fut>(self: &Arc<Self>, on_fire: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let timer = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let Some(deadline) = timer.deadline() else {
                    return;
                };

                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = timer.wake.notified() => continue,
                }

                // The deadline may have moved while we slept
                let fired = {
                    let mut inner = timer.lock();
                    if inner.state == TimerState::Armed && Instant::now() >= inner.deadline {
                        inner.state = TimerState::Fired;
                        true
                    } else {
                        false
                    }
                };

                if fired {
                    tracing::debug!(
                        timeout_ms = timer.timeout.as_millis() as u64,
                        "Idle deadline elapsed"
                    );
                    on_fire().await;
                    return;
                }
            }
        })
    }
}
