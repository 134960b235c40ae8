//! Activity clock for connection liveness.
//!
//! Tracks the last-send and last-receive instants of a connection as atomic
//! millisecond offsets from a per-clock epoch, so the reader, writer, and
//! monitor tasks can all touch it without locking.
//!
//! Uses `tokio::time::Instant` so tests driven by a paused runtime clock
//! observe consistent elapsed times.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Atomic last-send / last-receive stamps shared by a session's tasks.
#[derive(Debug)]
pub struct ActivityClock {
    epoch: Instant,
    last_send_ms: AtomicU64,
    last_recv_ms: AtomicU64,
}

impl ActivityClock {
    /// Create a clock with both stamps set to now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_send_ms: AtomicU64::new(0),
            last_recv_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Record outbound activity.
    pub fn touch_send(&self) {
        self.last_send_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Record inbound activity. Any received packet counts, heartbeat or data.
    pub fn touch_recv(&self) {
        self.last_recv_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Time since the last outbound packet was enqueued.
    pub fn since_send(&self) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(self.last_send_ms.load(Ordering::Relaxed)))
    }

    /// Time since the last inbound packet was observed.
    pub fn since_recv(&self) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(self.last_recv_ms.load(Ordering::Relaxed)))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stamps_advance_with_time() {
        let clock = ActivityClock::new();
        assert_eq!(clock.since_recv(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(clock.since_recv() >= Duration::from_millis(250));

        clock.touch_recv();
        assert_eq!(clock.since_recv(), Duration::ZERO);
        assert!(clock.since_send() >= Duration::from_millis(250));
    }
}
