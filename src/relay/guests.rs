//! Guest admission and per-guest tasks

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::error::{RelayError, Side};
use crate::registry::store::GUEST_CLOSE_TIMEOUT;
use crate::registry::{Guest, GuestError, Registration};

use super::shared::{panic_message, wait_shutdown, OnPanic, Shared};
use super::state::CloseReason;

/// Consume the join queue until it closes or the session ends
pub(crate) async fn admit_guests(shared: Arc<Shared>, mut queue: mpsc::Receiver<Guest>) {
    let mut shutdown = shared.shutdown_signal();

    loop {
        let guest = tokio::select! {
            _ = wait_shutdown(&mut shutdown) => break,
            guest = queue.recv() => match guest {
                Some(guest) => guest,
                None => {
                    tracing::debug!(session_id = %shared.session_id, "Guest queue closed");
                    return;
                }
            },
        };

        let identity = guest.identity().map(str::to_owned);
        if let Err(payload) = AssertUnwindSafe(admit(&shared, guest)).catch_unwind().await {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                session_id = %shared.session_id,
                identity = ?identity,
                error = %RelayError::Panicked { task: "guest-admission", message },
                "Failed to admit guest"
            );
        }
    }

    // Session is gone; turn away anyone still queued
    queue.close();
    while let Ok(guest) = queue.try_recv() {
        guest.reject().await;
    }
}

async fn admit(shared: &Arc<Shared>, guest: Guest) {
    if shared.is_closed() {
        guest.reject().await;
        return;
    }

    let registration = shared.registry.register(guest).await;
    let id = registration.id;
    shared.stats.inc_guests_admitted();

    tracing::info!(
        session_id = %shared.session_id,
        guest_id = %id,
        "New viewer joined"
    );

    let task = shared.spawn_task(
        "guest",
        OnPanic::PruneGuest(id),
        run_guest(Arc::clone(shared), registration),
    );
    // If teardown already drained the registry, the task hangs up on its own
    shared.registry.attach_task(id, task).await;
}

/// Relay one guest: its input goes to the backend, broadcasts go to it
async fn run_guest(shared: Arc<Shared>, registration: Registration) {
    let Registration {
        id,
        mut inbound,
        outbound,
        mut frames,
    } = registration;
    let mut shutdown = shared.shutdown_signal();

    let failure = loop {
        tokio::select! {
            _ = wait_shutdown(&mut shutdown) => break None,

            message = inbound.next() => match message {
                Some(Ok(data)) => {
                    if data.is_empty() {
                        continue;
                    }
                    if let Err(err) = shared.write_to(Side::Backend, &data).await {
                        tracing::debug!(session_id = %shared.session_id, guest_id = %id, error = %err, "Backend write failed");
                        // Teardown waits on guest tasks, so it must not run on this one
                        let session = Arc::clone(&shared);
                        tokio::spawn(async move {
                            let _ = session.teardown(CloseReason::BackendError).await;
                        });
                        continue;
                    }
                    shared.stats.add_guest_bytes(data.len());
                    shared.timer.rearm();
                }
                Some(Err(e)) => break Some(GuestError::Read(e)),
                None => break Some(GuestError::Disconnected),
            },

            frame = frames.recv() => match frame {
                Ok(chunk) => {
                    let send = outbound.send(chunk);
                    tokio::pin!(send);

                    // A stalled viewer must still notice teardown, but the
                    // chunk in hand is already off the channel
                    let sent = tokio::select! {
                        sent = &mut send => sent,
                        _ = wait_shutdown(&mut shutdown) => {
                            if !matches!(tokio::time::timeout(GUEST_CLOSE_TIMEOUT, send).await, Ok(Ok(()))) {
                                tracing::debug!(session_id = %shared.session_id, guest_id = %id, "Chunk in flight not delivered");
                            }
                            break None;
                        }
                    };
                    if let Err(e) = sent {
                        break Some(GuestError::Write(e));
                    }
                }
                Err(RecvError::Lagged(skipped)) => break Some(GuestError::Lagged(skipped)),
                Err(RecvError::Closed) => break None,
            },
        }
    };

    shared.registry.unregister(id).await;

    let Some(reason) = failure else {
        // Session is closing: deliver what was already broadcast, then hang up
        let flushed = tokio::time::timeout(GUEST_CLOSE_TIMEOUT, async {
            while let Ok(chunk) = frames.try_recv() {
                if let Err(e) = outbound.send(chunk).await {
                    return Err(e);
                }
            }
            outbound.close().await
        })
        .await;
        if !matches!(flushed, Ok(Ok(()))) {
            tracing::debug!(session_id = %shared.session_id, guest_id = %id, "Viewer not closed cleanly");
        }
        return;
    };

    shared.stats.inc_guests_pruned();
    if let Err(e) = outbound.close().await {
        tracing::trace!(guest_id = %id, error = %e, "Error closing departed viewer");
    }

    let lagged = matches!(reason, GuestError::Lagged(_));
    let err = RelayError::Guest { id, reason };
    if lagged {
        tracing::warn!(session_id = %shared.session_id, error = %err, "Dropping slow viewer");
    } else {
        tracing::debug!(session_id = %shared.session_id, error = %err, "Viewer disconnected");
    }
}
