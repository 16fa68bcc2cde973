//! Observability and Metrics
//!
//! Counters describing relay activity. One `Metrics` instance lives in the
//! server context; every task records into it with relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for relay operations
#[derive(Debug)]
pub struct Metrics {
    /// Total control connections accepted
    pub connections_total: AtomicU64,
    /// Currently open control connections
    pub connections_active: AtomicU64,
    /// Successful logins
    pub logins_accepted: AtomicU64,
    /// Logins refused by access control or version check
    pub logins_rejected: AtomicU64,
    /// Frames decoded from clients
    pub frames_received: AtomicU64,
    /// Frames written to clients
    pub frames_sent: AtomicU64,
    /// Peer transfers that ended with the success byte
    pub relays_completed: AtomicU64,
    /// Peer transfers that were truncated or dropped
    pub relays_failed: AtomicU64,
    /// Payload bytes forwarded to destinations
    pub relay_bytes: AtomicU64,
    /// Datagrams forwarded between lobby members
    pub datagrams_forwarded: AtomicU64,
    /// UDP addresses bound to lobby slots
    pub udp_bindings: AtomicU64,
    /// Lobbies created
    pub lobbies_created: AtomicU64,
    /// Lobbies removed by the idle sweep
    pub lobbies_swept: AtomicU64,
    /// Connections closed for protocol violations
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            logins_accepted: AtomicU64::new(0),
            logins_rejected: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            relays_completed: AtomicU64::new(0),
            relays_failed: AtomicU64::new(0),
            relay_bytes: AtomicU64::new(0),
            datagrams_forwarded: AtomicU64::new(0),
            udp_bindings: AtomicU64::new(0),
            lobbies_created: AtomicU64::new(0),
            lobbies_swept: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn login_accepted(&self) {
        self.logins_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_rejected(&self) {
        self.logins_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a peer transfer
    pub fn relay_finished(&self, forwarded: u64, success: bool) {
        self.relay_bytes.fetch_add(forwarded, Ordering::Relaxed);
        if success {
            self.relays_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.relays_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn datagram_forwarded(&self) {
        self.datagrams_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn udp_bound(&self) {
        self.udp_bindings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lobby_created(&self) {
        self.lobbies_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lobbies_swept(&self, count: u64) {
        self.lobbies_swept.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a protocol error
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            logins_accepted: self.logins_accepted.load(Ordering::Relaxed),
            logins_rejected: self.logins_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            relays_completed: self.relays_completed.load(Ordering::Relaxed),
            relays_failed: self.relays_failed.load(Ordering::Relaxed),
            relay_bytes: self.relay_bytes.load(Ordering::Relaxed),
            datagrams_forwarded: self.datagrams_forwarded.load(Ordering::Relaxed),
            udp_bindings: self.udp_bindings.load(Ordering::Relaxed),
            lobbies_created: self.lobbies_created.load(Ordering::Relaxed),
            lobbies_swept: self.lobbies_swept.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            logins_accepted = snapshot.logins_accepted,
            logins_rejected = snapshot.logins_rejected,
            frames_received = snapshot.frames_received,
            frames_sent = snapshot.frames_sent,
            relays_completed = snapshot.relays_completed,
            relays_failed = snapshot.relays_failed,
            relay_bytes = snapshot.relay_bytes,
            datagrams_forwarded = snapshot.datagrams_forwarded,
            udp_bindings = snapshot.udp_bindings,
            lobbies_created = snapshot.lobbies_created,
            lobbies_swept = snapshot.lobbies_swept,
            protocol_errors = snapshot.protocol_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Relay metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub logins_accepted: u64,
    pub logins_rejected: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub relays_completed: u64,
    pub relays_failed: u64,
    pub relay_bytes: u64,
    pub datagrams_forwarded: u64,
    pub udp_bindings: u64,
    pub lobbies_created: u64,
    pub lobbies_swept: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.connection_established();
        metrics.connection_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.connections_active, 1);
    }

    #[test]
    fn test_relay_counters() {
        let metrics = Metrics::new();
        metrics.relay_finished(100, true);
        metrics.relay_finished(40, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.relays_completed, 1);
        assert_eq!(snapshot.relays_failed, 1);
        assert_eq!(snapshot.relay_bytes, 140);
    }
}
