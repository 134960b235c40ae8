//! # Session
//!
//! Binds one connection state machine to one application message handler,
//! runs its loops, and enforces liveness.
//!
//! ## Tasks
//! Three concurrent tasks cooperate over a session: the **receive loop**
//! (runs on the caller of [`Session::run`], normally the per-connection
//! accept task), the **flush task** draining the send queue, and the
//! **monitor task** ticking at half the heartbeat interval. They coordinate
//! only through the session's atomic state, the activity clock, the send
//! queue, and a shutdown watch channel; no lock is held across I/O.
//!
//! ## Liveness
//! Nothing received for twice the heartbeat interval is fatal: the monitor
//! stops the session and the peer must reconnect. When the session itself
//! has been idle for half the heartbeat interval, a heartbeat goes out to
//! keep intermediaries from reclaiming the connection.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::core::packet::Packet;
use crate::error::{GateError, Result};
use crate::protocol::state::{ConnState, LifecycleState, StateCell};
use crate::session::conn::Conn;
use crate::session::manager::SessionManager;
use crate::session::MessageHandler;
use crate::transport::socket::PacketSender;
use crate::utils::{ActivityClock, Metrics};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Constructed, loops not yet started.
    Init = 0,
    /// Loops running, handshake pending.
    Running = 1,
    /// Handshake complete, application traffic observed.
    Working = 2,
    /// Teardown in progress.
    Closing = 3,
    /// Fully stopped. `run` accepts this as a restart point.
    Closed = 4,
}

impl LifecycleState for SessionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => SessionState::Init,
            1 => SessionState::Running,
            2 => SessionState::Working,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    fn as_raw(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            SessionState::Init => "INIT",
            SessionState::Running => "RUNNING",
            SessionState::Working => "WORKING",
            SessionState::Closing => "CLOSING",
            SessionState::Closed => "CLOSED",
        }
    }
}

/// The live binding between one accepted connection and the application.
pub struct Session {
    /// Process-unique id, 0 until the manager assigns one.
    id: AtomicU64,
    state: StateCell<SessionState>,
    conn_state: Arc<StateCell<ConnState>>,
    conn: Mutex<Option<Conn>>,
    sender: PacketSender,
    clock: Arc<ActivityClock>,
    shutdown: watch::Sender<bool>,
    heartbeat: Duration,
    peer: SocketAddr,
    handler: Arc<dyn MessageHandler>,
    manager: Arc<SessionManager>,
    metrics: Arc<Metrics>,
}

impl Session {
    pub fn new(
        conn: Conn,
        handler: Arc<dyn MessageHandler>,
        manager: Arc<SessionManager>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            id: AtomicU64::new(0),
            state: StateCell::new(SessionState::Init),
            conn_state: conn.state_cell(),
            sender: conn.sender(),
            clock: conn.clock(),
            heartbeat: conn.heartbeat(),
            peer: conn.peer(),
            conn: Mutex::new(Some(conn)),
            shutdown,
            handler,
            manager,
            metrics,
        })
    }

    /// Process-unique session id, 0 while unregistered.
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    pub(crate) fn set_id(&self, id: u64) {
        self.id.store(id, Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn conn_state(&self) -> ConnState {
        self.conn_state.get()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Enqueue a packet for ordered delivery to this session's peer.
    pub fn send_packet(&self, packet: Packet) -> Result<()> {
        match self.state.get() {
            SessionState::Closing | SessionState::Closed => Err(GateError::ConnectionClosed),
            _ => self.sender.send(packet),
        }
    }

    /// Build and enqueue an application packet from raw body bytes.
    pub fn send_data(&self, id: u16, body: &[u8]) -> Result<()> {
        let mut packet = Packet::with_capacity(id, body.len());
        packet.append_raw(body);
        self.send_packet(packet)
    }

    /// Run this session to completion on the calling task.
    ///
    /// Registers with the session manager (acquiring the id and an admission
    /// slot) before the first receive, starts the flush task and, when a
    /// heartbeat interval is configured, the monitor task, then drives the
    /// receive loop. Returns once the session has fully stopped.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        if self
            .state
            .transition(SessionState::Init, SessionState::Running)
            .is_err()
        {
            // A stopped session object may be driven again.
            self.state
                .transition(SessionState::Closed, SessionState::Running)?;
        }

        let taken = self
            .conn
            .lock()
            .map_err(|_| GateError::Custom("session connection lock poisoned".into()))?
            .take();
        let mut conn = match taken {
            Some(conn) => conn,
            None => {
                let _ = self
                    .state
                    .transition(SessionState::Running, SessionState::Closed);
                return Err(GateError::Custom(
                    crate::error::constants::ERR_ALREADY_RUNNING.into(),
                ));
            }
        };

        // Register before the receive loop so the first message already sees
        // an assigned id.
        if let Err(e) = self.manager.on_session_created(self) {
            let _ = self
                .state
                .transition(SessionState::Running, SessionState::Closed);
            return Err(e);
        }

        if let Some(flush) = conn.take_flush_loop() {
            tokio::spawn(flush.run());
        }
        if self.heartbeat > Duration::ZERO {
            tokio::spawn(self.clone().monitor());
        }

        info!(session_id = self.id(), peer = %self.peer, "session started");

        let result = self.recv_loop(&mut conn).await;

        if let Err(ref e) = result {
            if e.is_protocol_violation() {
                self.metrics.protocol_error();
            }
        }
        self.stop();
        result
    }

    async fn recv_loop(self: &Arc<Self>, conn: &mut Conn) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                return Ok(());
            }

            tokio::select! {
                _ = shutdown_rx.changed() => continue,
                received = conn.recv() => match received {
                    Ok(Some(packet)) => {
                        if self.state.is(SessionState::Running)
                            && self.conn_state.is(ConnState::Working)
                        {
                            let _ = self
                                .state
                                .transition(SessionState::Running, SessionState::Working);
                        }
                        self.dispatch(packet).await?;
                    }
                    Ok(None) => {
                        debug!(session_id = self.id(), peer = %self.peer, "peer closed connection");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(session_id = self.id(), peer = %self.peer, error = %e, "receive failed");
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Dispatch one application packet, containing handler panics to this
    /// session.
    async fn dispatch(self: &Arc<Self>, packet: Packet) -> Result<()> {
        let dispatched = AssertUnwindSafe(self.handler.on_message(self, packet))
            .catch_unwind()
            .await;
        match dispatched {
            Ok(()) => Ok(()),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".into());
                error!(
                    session_id = self.id(),
                    peer = %self.peer,
                    panic = %detail,
                    "message handler panicked, closing session"
                );
                Err(GateError::Custom(format!("handler panicked: {detail}")))
            }
        }
    }

    /// Periodic liveness check at half the heartbeat interval.
    async fn monitor(self: Arc<Self>) {
        let half = self.heartbeat / 2;
        let mut ticker = tokio::time::interval(half.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => continue,
                _ = ticker.tick() => {
                    if !matches!(self.state.get(), SessionState::Running | SessionState::Working) {
                        return;
                    }
                    if self.clock.since_recv() > self.heartbeat * 2 {
                        self.metrics.receive_timeout();
                        warn!(
                            session_id = self.id(),
                            peer = %self.peer,
                            idle_ms = self.clock.since_recv().as_millis() as u64,
                            "receive timeout, closing session"
                        );
                        self.stop();
                        return;
                    }
                    if self.clock.since_send() >= half {
                        let _ = self
                            .sender
                            .send(crate::protocol::message::ControlMessage::Heartbeat.encode());
                    }
                }
            }
        }
    }

    /// Stop the session: close the connection, unwind all three tasks, and
    /// deregister. Safe to call from any task; double-stop is a reported
    /// no-op.
    pub fn stop(&self) {
        let began = self
            .state
            .transition_from_any(
                &[SessionState::Running, SessionState::Working],
                SessionState::Closing,
            )
            .is_ok();
        if !began {
            debug!(
                session_id = self.id(),
                state = self.state.get().name(),
                "stop ignored, session not running"
            );
            return;
        }

        Conn::begin_close(&self.conn_state);

        // Wake the receive and monitor loops, then unwind the writer; queued
        // packets (including a handshake failure response) flush first.
        let _ = self.shutdown.send(true);
        self.sender.shutdown();

        Conn::finish_close(&self.conn_state);
        let _ = self
            .state
            .transition(SessionState::Closing, SessionState::Closed);

        self.manager.on_session_closed(self);
        info!(session_id = self.id(), peer = %self.peer, "session stopped");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state.get())
            .field("conn_state", &self.conn_state.get())
            .field("peer", &self.peer)
            .finish()
    }
}
