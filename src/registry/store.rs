//! Guest registry implementation
//!
//! Tracks the live guests of one session and fans backend output out to them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tokio::task::{AbortHandle, JoinHandle};

use super::entry::{GuestEntry, GuestInfo, GuestOutbound};
use super::guest::{Guest, GuestId, GuestStream};

/// Upper bound on a guest's final flush and close during teardown
pub const GUEST_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a guest task needs after admission
pub struct Registration {
    /// Assigned guest ID
    pub id: GuestId,
    /// Inbound messages from the guest
    pub inbound: GuestStream,
    /// Outbound half, shared with the registry for teardown
    pub outbound: GuestOutbound,
    /// Broadcast chunks emitted after admission
    pub frames: broadcast::Receiver<Bytes>,
}

/// Live-guest collection and broadcaster for one session
///
/// Thread-safe via `RwLock`. Broadcasting only touches the channel, so it
/// never contends with admission or removal.
pub struct GuestRegistry {
    /// Live guests keyed by ID
    guests: RwLock<HashMap<GuestId, GuestEntry>>,

    /// Everyone who joined, including departed guests
    roster: Mutex<Vec<GuestInfo>>,

    /// Broadcast sender for fan-out to guest tasks
    tx: broadcast::Sender<Bytes>,

    next_id: AtomicU64,
}

impl GuestRegistry {
    /// Create a registry; `backlog` bounds how far a guest may lag
    pub fn new(backlog: usize) -> Self {
        let (tx, _) = broadcast::channel(backlog.max(1));

        Self {
            guests: RwLock::new(HashMap::new()),
            roster: Mutex::new(Vec::new()),
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a guest
    ///
    /// The guest is subscribed before it becomes visible, so it receives
    /// every chunk broadcast after this call returns.
    pub async fn register(&self, guest: Guest) -> Registration {
        let id = GuestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (identity, inbound, sink) = guest.into_parts();
        let outbound = GuestOutbound::new(sink);
        let frames = self.tx.subscribe();

        let info = GuestInfo {
            id,
            identity,
            joined_at: Instant::now(),
        };

        self.roster
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(info.clone());

        let mut guests = self.guests.write().await;
        guests.insert(
            id,
            GuestEntry {
                info,
                outbound: outbound.clone(),
                task: None,
            },
        );

        tracing::debug!(guest_id = %id, guests = guests.len(), "Guest registered");

        Registration {
            id,
            inbound,
            outbound,
            frames,
        }
    }

    /// Remove a guest. Returns false if it was already gone.
    pub async fn unregister(&self, id: GuestId) -> bool {
        let mut guests = self.guests.write().await;
        let removed = guests.remove(&id).is_some();

        if removed {
            tracing::debug!(guest_id = %id, guests = guests.len(), "Guest removed");
        }
        removed
    }

    /// Broadcast a chunk to every registered guest
    ///
    /// Returns the number of guests the chunk was queued for.
    pub fn broadcast(&self, chunk: Bytes) -> usize {
        // send() only fails when nobody is subscribed
        self.tx.send(chunk).unwrap_or(0)
    }

    /// Number of live guests
    pub async fn guest_count(&self) -> usize {
        self.guests.read().await.len()
    }

    /// Live guests, ordered by ID
    pub async fn guests(&self) -> Vec<GuestInfo> {
        let guests = self.guests.read().await;
        let mut infos: Vec<GuestInfo> = guests.values().map(|e| e.info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Every guest admitted so far, in admission order
    pub fn roster(&self) -> Vec<GuestInfo> {
        self.roster
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Attach the guest's relay task so teardown can wait for it.
    ///
    /// Returns false if the guest is no longer registered.
    pub async fn attach_task(&self, id: GuestId, task: JoinHandle<()>) -> bool {
        match self.guests.write().await.get_mut(&id) {
            Some(entry) => {
                entry.task = Some(task);
                true
            }
            None => false,
        }
    }

    /// Remove and close every guest, ignoring individual failures
    ///
    /// Guest tasks flush what was already broadcast and hang up concurrently.
    /// All of them together get [`GUEST_CLOSE_TIMEOUT`]; tasks still running
    /// after that are aborted. Returns the number of guests closed.
    pub async fn close_all(&self) -> usize {
        let entries: Vec<(GuestId, GuestEntry)> = self.guests.write().await.drain().collect();
        let count = entries.len();

        let aborts: Vec<AbortHandle> = entries
            .iter()
            .filter_map(|(_, entry)| entry.task.as_ref().map(JoinHandle::abort_handle))
            .collect();

        let closes = entries.into_iter().map(|(id, entry)| async move {
            if let Some(task) = entry.task {
                let _ = task.await;
            }
            if let Err(e) = entry.outbound.close().await {
                tracing::debug!(guest_id = %id, error = %e, "Error closing guest");
            }
        });

        if tokio::time::timeout(GUEST_CLOSE_TIMEOUT, join_all(closes))
            .await
            .is_err()
        {
            tracing::debug!(guests = count, "Guests overran close timeout");
            for task in aborts {
                task.abort();
            }
        }

        count
    }
}
