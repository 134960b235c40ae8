//! # Session Manager
//!
//! Tracks live sessions for the whole process: assigns ids, maintains the
//! id lookup table and the live count, and enforces the maximum-connection
//! admission policy.
//!
//! Admission is authoritative at registration: the live counter is advanced
//! by a compare-and-swap that can never push it past the configured
//! maximum, so the limit holds even when accepts race.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{GateError, Result};
use crate::session::session::Session;
use crate::utils::Metrics;

/// Registry of live sessions with admission control.
pub struct SessionManager {
    max_connections: usize,
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    live: AtomicUsize,
    next_id: AtomicU64,
    metrics: Arc<Metrics>,
}

impl SessionManager {
    pub fn new(max_connections: usize, metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            max_connections,
            sessions: Mutex::new(HashMap::new()),
            live: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            metrics,
        })
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Current number of registered sessions.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Whether a new connection would currently be admitted. Advisory only;
    /// the accept loop uses it to reject cheaply before the transport
    /// upgrade. Registration re-checks authoritatively.
    pub fn has_capacity(&self) -> bool {
        self.live() < self.max_connections
    }

    /// Record a connection refused by the admission policy.
    pub fn record_rejection(&self) {
        self.metrics.connection_rejected();
    }

    /// Register a session: claim a live slot, assign the id, add it to the
    /// lookup table. Fails with [`GateError::AtCapacity`] when the limit is
    /// reached; the caller must then discard the connection.
    pub fn on_session_created(&self, session: &Arc<Session>) -> Result<u64> {
        let admitted = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                if live >= self.max_connections {
                    None
                } else {
                    Some(live + 1)
                }
            })
            .is_ok();
        if !admitted {
            self.metrics.connection_rejected();
            return Err(GateError::AtCapacity {
                max: self.max_connections,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        session.set_id(id);
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id, session.clone());
        }
        self.metrics.connection_established();
        debug!(session_id = id, peer = %session.peer(), live = self.live(), "session registered");
        Ok(id)
    }

    /// Deregister a session and free its slot. Idempotent: only the call
    /// that actually removes the entry decrements the count.
    pub fn on_session_closed(&self, session: &Session) {
        let id = session.id();
        let removed = self
            .sessions
            .lock()
            .map(|mut sessions| sessions.remove(&id).is_some())
            .unwrap_or(false);
        if removed {
            self.live.fetch_sub(1, Ordering::AcqRel);
            self.metrics.connection_closed();
            debug!(session_id = id, live = self.live(), "session deregistered");
        }
    }

    /// Look up a live session by id.
    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.lock().ok().and_then(|s| s.get(&id).cloned())
    }

    /// Stop every tracked session.
    pub fn stop_all(&self) {
        let all: Vec<Arc<Session>> = self
            .sessions
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default();
        info!(count = all.len(), "stopping all sessions");
        for session in all {
            session.stop();
        }
    }
}
