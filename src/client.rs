//! # Client Connector
//!
//! The peer side of the exchange: connect over TCP, drive the handshake to
//! completion, then exchange application packets. Heartbeats arriving from
//! the server are absorbed here; [`GateClient::send_heartbeat`] keeps the
//! session alive from the client side.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::config::MAX_BODY_LEN;
use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{GateError, Result};
use crate::protocol::message::{is_control, ControlMessage, HANDSHAKE_OK, MSG_HEARTBEAT};
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};
use crate::utils::ActivityClock;

/// A connected, handshaken client endpoint.
pub struct GateClient {
    framed: Framed<TcpStream, PacketCodec>,
    heartbeat: Duration,
    clock: ActivityClock,
}

impl GateClient {
    /// Connect and complete the handshake with default limits and timeout.
    pub async fn connect(addr: &str, key: &str) -> Result<Self> {
        Self::connect_with(addr, key, MAX_BODY_LEN, DEFAULT_TIMEOUT).await
    }

    /// Connect and complete the handshake.
    ///
    /// The returned client is in the working state: the server has accepted
    /// the key, the acknowledgement is on the wire, and the negotiated
    /// heartbeat interval is available via [`GateClient::heartbeat_interval`].
    pub async fn connect_with(
        addr: &str,
        key: &str,
        max_body_len: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let stream = with_timeout_error(
            async { TcpStream::connect(addr).await.map_err(GateError::from) },
            timeout,
        )
        .await?;
        stream.set_nodelay(true).ok();
        let mut framed = Framed::new(stream, PacketCodec::new(max_body_len));

        framed
            .send(
                ControlMessage::HandshakeRequest {
                    key: key.to_string(),
                }
                .encode(),
            )
            .await?;

        let mut response = with_timeout_error(
            async {
                framed
                    .next()
                    .await
                    .ok_or(GateError::ConnectionClosed)?
            },
            timeout,
        )
        .await?;

        match ControlMessage::decode(&mut response)? {
            ControlMessage::HandshakeResponse {
                code: HANDSHAKE_OK,
                heartbeat_ms,
            } => {
                framed.send(ControlMessage::HandshakeAck.encode()).await?;
                debug!(addr, heartbeat_ms, "handshake complete");
                Ok(Self {
                    framed,
                    heartbeat: Duration::from_millis(u64::from(heartbeat_ms)),
                    clock: ActivityClock::new(),
                })
            }
            ControlMessage::HandshakeResponse { code, .. } => Err(GateError::HandshakeFailed(
                format!("rejected by server with code {code}"),
            )),
            other => Err(GateError::HandshakeFailed(format!(
                "unexpected message during handshake: {other:?}"
            ))),
        }
    }

    /// Heartbeat interval negotiated by the server.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat
    }

    /// Time since the last packet arrived from the server.
    pub fn idle_time(&self) -> Duration {
        self.clock.since_recv()
    }

    pub async fn send(&mut self, packet: Packet) -> Result<()> {
        self.framed.send(packet).await?;
        self.clock.touch_send();
        Ok(())
    }

    /// Build and send an application packet from raw body bytes.
    pub async fn send_data(&mut self, id: u16, body: &[u8]) -> Result<()> {
        let mut packet = Packet::with_capacity(id, body.len());
        packet.append_raw(body);
        self.send(packet).await
    }

    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.send(ControlMessage::Heartbeat.encode()).await
    }

    /// Next application packet. Heartbeats and other control traffic are
    /// absorbed; `Ok(None)` is a clean server close.
    pub async fn recv(&mut self) -> Result<Option<Packet>> {
        loop {
            match self.framed.next().await {
                Some(Ok(packet)) => {
                    self.clock.touch_recv();
                    if packet.id() == MSG_HEARTBEAT {
                        continue;
                    }
                    if is_control(packet.id()) {
                        trace!(id = packet.id(), "ignoring control packet");
                        continue;
                    }
                    return Ok(Some(packet));
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }

    /// Flush and close the connection.
    pub async fn close(mut self) -> Result<()> {
        self.framed.close().await
    }
}
