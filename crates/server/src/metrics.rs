//! Lock-free server counters.
//!
//! Connection tasks bump these with relaxed atomics; the status endpoint
//! reads them whenever it is polled.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

pub struct Metrics {
    envelopes_handled: AtomicU64,
    envelopes_ignored: AtomicU64,
    envelopes_rejected: AtomicU64,
    broadcasts_sent: AtomicU64,
    deliveries_failed: AtomicU64,

    // Gauges
    connections_open: AtomicU64,
    sessions_connected: AtomicU64,

    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            envelopes_handled: AtomicU64::new(0),
            envelopes_ignored: AtomicU64::new(0),
            envelopes_rejected: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
            connections_open: AtomicU64::new(0),
            sessions_connected: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn envelope_handled(&self) {
        self.envelopes_handled.fetch_add(1, Relaxed);
    }

    /// Unknown route, or a game message before the handshake finished.
    pub fn envelope_ignored(&self) {
        self.envelopes_ignored.fetch_add(1, Relaxed);
    }

    /// Undecodable frame or payload.
    pub fn envelope_rejected(&self) {
        self.envelopes_rejected.fetch_add(1, Relaxed);
    }

    pub fn record_broadcast(&self, failed_deliveries: u64) {
        self.broadcasts_sent.fetch_add(1, Relaxed);
        if failed_deliveries > 0 {
            self.deliveries_failed.fetch_add(failed_deliveries, Relaxed);
        }
    }

    pub fn connection_opened(&self) {
        self.connections_open.fetch_add(1, Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_open.fetch_sub(1, Relaxed);
    }

    pub fn session_joined(&self) {
        self.sessions_connected.fetch_add(1, Relaxed);
    }

    pub fn session_left(&self) {
        self.sessions_connected.fetch_sub(1, Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            envelopes_handled: self.envelopes_handled.load(Relaxed),
            envelopes_ignored: self.envelopes_ignored.load(Relaxed),
            envelopes_rejected: self.envelopes_rejected.load(Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Relaxed),
            deliveries_failed: self.deliveries_failed.load(Relaxed),
            connections_open: self.connections_open.load(Relaxed),
            sessions_connected: self.sessions_connected.load(Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub envelopes_handled: u64,
    pub envelopes_ignored: u64,
    pub envelopes_rejected: u64,
    pub broadcasts_sent: u64,
    pub deliveries_failed: u64,
    pub connections_open: u64,
    pub sessions_connected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_failures_accumulate() {
        let metrics = Metrics::new();
        metrics.record_broadcast(0);
        metrics.record_broadcast(2);
        let snap = metrics.snapshot();
        assert_eq!(snap.broadcasts_sent, 2);
        assert_eq!(snap.deliveries_failed, 2);
    }
}
