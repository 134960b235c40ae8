//! Observability and Metrics
//!
//! This module provides metrics collection for monitoring connection-engine
//! health: admission decisions, handshake outcomes, traffic volume, and
//! liveness failures.
//!
//! Uses atomic counters for thread-safe collection without locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters shared by the acceptors, session manager, and sessions.
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted and admitted
    pub connections_total: AtomicU64,
    /// Currently live sessions
    pub connections_active: AtomicU64,
    /// Connections closed at accept time by the admission policy
    pub connections_rejected: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Failed handshakes (key mismatch)
    pub handshakes_failed: AtomicU64,
    /// Total packets enqueued for send
    pub packets_sent: AtomicU64,
    /// Total packets decoded from the wire
    pub packets_received: AtomicU64,
    /// Total payload bytes enqueued for send
    pub bytes_sent: AtomicU64,
    /// Total payload bytes decoded from the wire
    pub bytes_received: AtomicU64,
    /// Sessions closed by the receive-timeout monitor
    pub receive_timeouts: AtomicU64,
    /// Frames rejected as protocol violations
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            receive_timeouts: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an admitted connection.
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session closure.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a connection refused by the admission policy.
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outbound packet with its on-wire size.
    pub fn packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record an inbound packet with its on-wire size.
    pub fn packet_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn receive_timeout(&self) {
        self.receive_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Process uptime since this collector was created.
    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Emit a one-line summary of all counters at info level.
    pub fn log_summary(&self) {
        info!(
            uptime_secs = self.uptime().as_secs(),
            connections_total = self.connections_total.load(Ordering::Relaxed),
            connections_active = self.connections_active.load(Ordering::Relaxed),
            connections_rejected = self.connections_rejected.load(Ordering::Relaxed),
            handshakes_success = self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed = self.handshakes_failed.load(Ordering::Relaxed),
            packets_sent = self.packets_sent.load(Ordering::Relaxed),
            packets_received = self.packets_received.load(Ordering::Relaxed),
            bytes_sent = self.bytes_sent.load(Ordering::Relaxed),
            bytes_received = self.bytes_received.load(Ordering::Relaxed),
            receive_timeouts = self.receive_timeouts.load(Ordering::Relaxed),
            protocol_errors = self.protocol_errors.load(Ordering::Relaxed),
            "metrics summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_counters_balance() {
        let m = Metrics::new();
        m.connection_established();
        m.connection_established();
        m.connection_closed();

        assert_eq!(m.connections_total.load(Ordering::Relaxed), 2);
        assert_eq!(m.connections_active.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn traffic_counters_accumulate() {
        let m = Metrics::new();
        m.packet_sent(100);
        m.packet_sent(28);
        m.packet_received(6);

        assert_eq!(m.packets_sent.load(Ordering::Relaxed), 2);
        assert_eq!(m.bytes_sent.load(Ordering::Relaxed), 128);
        assert_eq!(m.packets_received.load(Ordering::Relaxed), 1);
        assert_eq!(m.bytes_received.load(Ordering::Relaxed), 6);
    }
}
