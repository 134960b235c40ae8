//! # Connection State Machine
//!
//! Wraps a socket with the handshake/heartbeat sub-protocol and the
//! connection lifecycle. All control packets are intercepted here;
//! [`Conn::recv`] only ever returns application packets, and only once the
//! handshake has completed.
//!
//! ## Handshake (server side)
//! 1. Client sends a handshake request carrying the shared key.
//! 2. In INIT, the key is validated against the configured key (empty
//!    configured key accepts any). Mismatch: failure response, then the
//!    connection closes. Match: WAIT_ACK, success response carrying the
//!    negotiated heartbeat interval.
//! 3. Client acknowledges. Only from WAIT_ACK does the connection enter
//!    WORKING, and one heartbeat goes out immediately so the peer's and our
//!    last-send clocks start ticking.
//! 4. Application packets before WORKING are fatal; a client cannot skip
//!    the handshake.
//!
//! Control packets arriving in states where they make no sense are ignored,
//! except at CLOSED where all I/O is rejected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::packet::Packet;
use crate::error::{GateError, Result};
use crate::protocol::message::{
    is_control, ControlMessage, HANDSHAKE_ERR_KEY, HANDSHAKE_OK,
};
use crate::protocol::state::{ConnState, LifecycleState, StateCell};
use crate::transport::socket::{FlushLoop, PacketSender, Socket};
use crate::utils::{ActivityClock, Metrics};

/// One connection's handshake/heartbeat state machine over its socket.
pub struct Conn {
    socket: Socket,
    state: Arc<StateCell<ConnState>>,
    shared_key: String,
    heartbeat: Duration,
    metrics: Arc<Metrics>,
}

impl Conn {
    pub fn new(
        socket: Socket,
        shared_key: String,
        heartbeat: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            socket,
            state: Arc::new(StateCell::new(ConnState::Init)),
            shared_key,
            heartbeat,
            metrics,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state.get()
    }

    /// Shared handle onto the lifecycle cell, for teardown initiated from
    /// other tasks while the receive loop owns `self`.
    pub fn state_cell(&self) -> Arc<StateCell<ConnState>> {
        self.state.clone()
    }

    pub fn sender(&self) -> PacketSender {
        self.socket.sender()
    }

    pub fn clock(&self) -> Arc<ActivityClock> {
        self.socket.clock()
    }

    pub fn peer(&self) -> SocketAddr {
        self.socket.peer()
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    pub fn take_flush_loop(&mut self) -> Option<FlushLoop> {
        self.socket.take_flush_loop()
    }

    /// Receive the next application packet, driving the handshake and
    /// absorbing heartbeats along the way. `Ok(None)` is a clean remote
    /// close; any error is fatal to the connection.
    pub async fn recv(&mut self) -> Result<Option<Packet>> {
        loop {
            if self.state.is(ConnState::Closed) {
                return Err(GateError::ConnectionClosed);
            }

            let Some(mut packet) = self.socket.recv().await? else {
                return Ok(None);
            };

            if !is_control(packet.id()) {
                return match self.state.get() {
                    ConnState::Working => Ok(Some(packet)),
                    state => {
                        warn!(
                            peer = %self.peer(),
                            id = packet.id(),
                            state = state.name(),
                            "application packet before handshake completion"
                        );
                        Err(GateError::UnexpectedPacket {
                            id: packet.id(),
                            state: state.name(),
                        })
                    }
                };
            }

            match ControlMessage::decode(&mut packet)? {
                ControlMessage::HandshakeRequest { key } => self.on_handshake_request(&key)?,
                ControlMessage::HandshakeAck => self.on_handshake_ack(),
                ControlMessage::Heartbeat => {
                    // Liveness only; the socket already refreshed the clock.
                }
                ControlMessage::HandshakeResponse { .. } => {
                    debug!(peer = %self.peer(), "handshake response ignored on server side");
                }
            }
        }
    }

    fn send_control(&self, msg: &ControlMessage) -> Result<()> {
        self.socket.sender().send(msg.encode())
    }

    fn on_handshake_request(&self, key: &str) -> Result<()> {
        match self.state.get() {
            ConnState::Init => {
                if !self.shared_key.is_empty() && key != self.shared_key {
                    // Explicit failure response before closing, so the peer
                    // can tell rejection from network loss.
                    let _ = self.send_control(&ControlMessage::HandshakeResponse {
                        code: HANDSHAKE_ERR_KEY,
                        heartbeat_ms: 0,
                    });
                    self.metrics.handshake_failed();
                    warn!(peer = %self.peer(), "handshake key mismatch");
                    return Err(GateError::KeyMismatch);
                }

                match self.state.transition(ConnState::Init, ConnState::WaitAck) {
                    Ok(()) => {
                        self.send_control(&ControlMessage::HandshakeResponse {
                            code: HANDSHAKE_OK,
                            heartbeat_ms: self.heartbeat.as_millis() as u32,
                        })?;
                        debug!(peer = %self.peer(), "handshake accepted, awaiting ack");
                    }
                    Err(_) => {
                        debug!(peer = %self.peer(), "concurrent handshake request ignored");
                    }
                }
                Ok(())
            }
            state => {
                debug!(peer = %self.peer(), state = state.name(), "handshake request ignored");
                Ok(())
            }
        }
    }

    fn on_handshake_ack(&self) {
        match self.state.transition(ConnState::WaitAck, ConnState::Working) {
            Ok(()) => {
                self.metrics.handshake_success();
                // Immediate heartbeat primes the last-send clock so the
                // monitor has a real baseline.
                let _ = self.send_control(&ControlMessage::Heartbeat);
                debug!(peer = %self.peer(), "handshake complete");
            }
            Err(_) => {
                debug!(peer = %self.peer(), state = self.state.get().name(), "handshake ack ignored");
            }
        }
    }

    /// First step of teardown: move any pre-close state to CLOSING. Returns
    /// whether this call performed the move.
    pub fn begin_close(state: &StateCell<ConnState>) -> bool {
        state
            .transition_from_any(
                &[ConnState::Init, ConnState::WaitAck, ConnState::Working],
                ConnState::Closing,
            )
            .is_ok()
    }

    /// Final step of teardown.
    pub fn finish_close(state: &StateCell<ConnState>) {
        let _ = state.transition(ConnState::Closing, ConnState::Closed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::message::MSG_HEARTBEAT;
    use crate::transport::{split_stream, FrameReader, FrameWriter, StreamReader, StreamWriter};

    /// Server-side conn over one end of a duplex pipe, with the flush loop
    /// running, plus the peer's raw framed halves.
    async fn conn_pair(
        key: &str,
    ) -> (
        Conn,
        StreamReader<tokio::io::DuplexStream>,
        StreamWriter<tokio::io::DuplexStream>,
    ) {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let (reader, writer) = split_stream(server_io, 4096, 1024);
        let socket = Socket::new(
            Box::new(reader),
            Box::new(writer),
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(ActivityClock::new()),
            Arc::new(Metrics::new()),
        );
        let mut conn = Conn::new(
            socket,
            key.to_string(),
            Duration::from_secs(30),
            Arc::new(Metrics::new()),
        );
        tokio::spawn(conn.take_flush_loop().unwrap().run());

        let (client_reader, client_writer) = split_stream(client_io, 4096, 1024);
        (conn, client_reader, client_writer)
    }

    #[tokio::test]
    async fn full_handshake_reaches_working() {
        let (mut conn, mut client_rx, mut client_tx) = conn_pair("sesame").await;

        client_tx
            .send(
                ControlMessage::HandshakeRequest {
                    key: "sesame".into(),
                }
                .encode(),
            )
            .await
            .unwrap();
        client_tx.send(ControlMessage::HandshakeAck.encode()).await.unwrap();

        let mut app = Packet::new(100);
        app.append_str("hello");
        client_tx.send(app).await.unwrap();

        let received = conn.recv().await.unwrap().unwrap();
        assert_eq!(received.id(), 100);
        assert_eq!(conn.state(), ConnState::Working);

        // Client observes the success response, then the primed heartbeat.
        let mut rsp = client_rx.recv().await.unwrap().unwrap();
        assert!(matches!(
            ControlMessage::decode(&mut rsp).unwrap(),
            ControlMessage::HandshakeResponse {
                code: HANDSHAKE_OK,
                heartbeat_ms: 30_000
            }
        ));
        let hb = client_rx.recv().await.unwrap().unwrap();
        assert_eq!(hb.id(), MSG_HEARTBEAT);
    }

    #[tokio::test]
    async fn wrong_key_sends_failure_and_fails() {
        let (mut conn, mut client_rx, mut client_tx) = conn_pair("sesame").await;

        client_tx
            .send(
                ControlMessage::HandshakeRequest {
                    key: "wrong".into(),
                }
                .encode(),
            )
            .await
            .unwrap();

        assert!(matches!(
            conn.recv().await,
            Err(GateError::KeyMismatch)
        ));
        assert_ne!(conn.state(), ConnState::Working);

        let mut rsp = client_rx.recv().await.unwrap().unwrap();
        assert!(matches!(
            ControlMessage::decode(&mut rsp).unwrap(),
            ControlMessage::HandshakeResponse {
                code: HANDSHAKE_ERR_KEY,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_configured_key_accepts_any() {
        let (mut conn, _client_rx, mut client_tx) = conn_pair("").await;

        client_tx
            .send(
                ControlMessage::HandshakeRequest {
                    key: "anything".into(),
                }
                .encode(),
            )
            .await
            .unwrap();
        client_tx.send(ControlMessage::HandshakeAck.encode()).await.unwrap();
        client_tx.send(Packet::new(500)).await.unwrap();

        assert_eq!(conn.recv().await.unwrap().unwrap().id(), 500);
    }

    #[tokio::test]
    async fn app_packet_before_handshake_is_fatal() {
        let (mut conn, _client_rx, mut client_tx) = conn_pair("sesame").await;

        client_tx.send(Packet::new(200)).await.unwrap();

        assert!(matches!(
            conn.recv().await,
            Err(GateError::UnexpectedPacket { id: 200, .. })
        ));
    }

    #[tokio::test]
    async fn app_packet_in_wait_ack_is_fatal() {
        let (mut conn, _client_rx, mut client_tx) = conn_pair("sesame").await;

        client_tx
            .send(
                ControlMessage::HandshakeRequest {
                    key: "sesame".into(),
                }
                .encode(),
            )
            .await
            .unwrap();
        client_tx.send(Packet::new(200)).await.unwrap();

        assert!(matches!(
            conn.recv().await,
            Err(GateError::UnexpectedPacket { .. })
        ));
        assert_eq!(conn.state(), ConnState::WaitAck);
    }

    #[tokio::test]
    async fn ack_without_request_is_ignored() {
        let (mut conn, _client_rx, mut client_tx) = conn_pair("sesame").await;

        client_tx.send(ControlMessage::HandshakeAck.encode()).await.unwrap();
        client_tx
            .send(
                ControlMessage::HandshakeRequest {
                    key: "sesame".into(),
                }
                .encode(),
            )
            .await
            .unwrap();
        client_tx.close().await.unwrap();

        // Stray ack left the state machine in INIT, so the later request
        // still succeeds; the clean close then ends the loop.
        assert!(conn.recv().await.unwrap().is_none());
        assert_eq!(conn.state(), ConnState::WaitAck);
    }

    #[tokio::test]
    async fn recv_at_closed_is_rejected() {
        let (mut conn, _client_rx, _client_tx) = conn_pair("").await;
        let cell = conn.state_cell();
        assert!(Conn::begin_close(&cell));
        Conn::finish_close(&cell);

        assert!(matches!(
            conn.recv().await,
            Err(GateError::ConnectionClosed)
        ));
    }
}
