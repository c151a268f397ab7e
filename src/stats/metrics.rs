//! Statistics and metrics for relayed sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one relayed session
///
/// Updated from every relay task without locking.
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    backend_bytes: AtomicU64,
    frontend_bytes: AtomicU64,
    guest_bytes: AtomicU64,
    chunks_broadcast: AtomicU64,
    guests_admitted: AtomicU64,
    guests_pruned: AtomicU64,
    recording_failures: AtomicU64,
}

impl RelayStats {
    /// Create a new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            backend_bytes: AtomicU64::new(0),
            frontend_bytes: AtomicU64::new(0),
            guest_bytes: AtomicU64::new(0),
            chunks_broadcast: AtomicU64::new(0),
            guests_admitted: AtomicU64::new(0),
            guests_pruned: AtomicU64::new(0),
            recording_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn add_backend_bytes(&self, n: usize) {
        self.backend_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_frontend_bytes(&self, n: usize) {
        self.frontend_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_guest_bytes(&self, n: usize) {
        self.guest_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn inc_chunks_broadcast(&self) {
        self.chunks_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_guests_admitted(&self) {
        self.guests_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_guests_pruned(&self) {
        self.guests_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_recording_failures(&self) {
        self.recording_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            backend_to_frontend_bytes: self.backend_bytes.load(Ordering::Relaxed),
            frontend_to_backend_bytes: self.frontend_bytes.load(Ordering::Relaxed),
            guest_to_backend_bytes: self.guest_bytes.load(Ordering::Relaxed),
            chunks_broadcast: self.chunks_broadcast.load(Ordering::Relaxed),
            guests_admitted: self.guests_admitted.load(Ordering::Relaxed),
            guests_pruned: self.guests_pruned.load(Ordering::Relaxed),
            recording_failures: self.recording_failures.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bytes read from the backend and forwarded to the frontend
    pub backend_to_frontend_bytes: u64,
    /// Bytes read from the frontend and written to the backend
    pub frontend_to_backend_bytes: u64,
    /// Bytes injected into the backend by guests
    pub guest_to_backend_bytes: u64,
    /// Backend chunks handed to the broadcaster
    pub chunks_broadcast: u64,
    /// Guests admitted over the session lifetime
    pub guests_admitted: u64,
    /// Guests removed after a failure or disconnect
    pub guests_pruned: u64,
    /// Transcript appends that failed
    pub recording_failures: u64,
    /// Session age
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let snap = RelayStats::new().snapshot();
        assert_eq!(snap.backend_to_frontend_bytes, 0);
        assert_eq!(snap.frontend_to_backend_bytes, 0);
        assert_eq!(snap.guest_to_backend_bytes, 0);
        assert_eq!(snap.chunks_broadcast, 0);
        assert_eq!(snap.guests_admitted, 0);
        assert_eq!(snap.guests_pruned, 0);
        assert_eq!(snap.recording_failures, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = RelayStats::new();
        stats.add_backend_bytes(5);
        stats.add_backend_bytes(5);
        stats.add_frontend_bytes(3);
        stats.add_guest_bytes(7);
        stats.inc_chunks_broadcast();
        stats.inc_guests_admitted();
        stats.inc_guests_admitted();
        stats.inc_guests_pruned();
        stats.inc_recording_failures();

        let snap = stats.snapshot();
        assert_eq!(snap.backend_to_frontend_bytes, 10);
        assert_eq!(snap.frontend_to_backend_bytes, 3);
        assert_eq!(snap.guest_to_backend_bytes, 7);
        assert_eq!(snap.chunks_broadcast, 1);
        assert_eq!(snap.guests_admitted, 2);
        assert_eq!(snap.guests_pruned, 1);
        assert_eq!(snap.recording_failures, 1);
    }
}
