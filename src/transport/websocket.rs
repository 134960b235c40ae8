//! # WebSocket Acceptor
//!
//! WebSocket transport for browser and proxy-traversing clients. Binary
//! WebSocket messages carry the same length-prefixed frames as the TCP
//! transport; a carry-over buffer feeds the incremental codec, so packet
//! frames may be split or batched across WebSocket messages without the
//! upper layers noticing.
//!
//! Text messages and protocol frames (ping/pong) are handled or ignored
//! below this layer; a Close frame ends the stream cleanly.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::core::codec::PacketCodec;
use crate::core::packet::{Packet, HEADER_LEN};
use crate::error::{GateError, Result};
use crate::transport::{Acceptor, FrameReader, FrameWriter};

/// Listener for framed WebSocket connections.
pub struct WsAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_body_len: usize,
    write_buffer_size: usize,
}

impl WsAcceptor {
    pub async fn bind(addr: &str, max_body_len: usize, write_buffer_size: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_body_len,
            write_buffer_size,
        })
    }
}

#[async_trait]
impl Acceptor for WsAcceptor {
    async fn accept_raw(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    async fn upgrade(
        &self,
        stream: TcpStream,
    ) -> Result<(Box<dyn FrameReader>, Box<dyn FrameWriter>)> {
        stream.set_nodelay(true).ok();

        let mut config = WebSocketConfig::default();
        // Bound covers one frame header plus the largest legal body.
        config.max_message_size = Some(self.max_body_len + HEADER_LEN);
        config.max_frame_size = Some(self.max_body_len + HEADER_LEN);
        config.write_buffer_size = self.write_buffer_size;

        let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(config))
            .await
            .map_err(|e| GateError::WebSocketError(format!("upgrade failed: {e}")))?;

        let (sink, source) = ws_stream.split();
        let reader = WsReader {
            inner: source,
            codec: PacketCodec::new(self.max_body_len),
            buf: BytesMut::new(),
        };
        let writer = WsWriter { inner: sink };
        Ok((Box::new(reader), Box::new(writer)))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn scheme(&self) -> &'static str {
        "ws"
    }
}

/// Receiving half: binary WebSocket messages feed the incremental codec.
pub struct WsReader {
    inner: SplitStream<WebSocketStream<TcpStream>>,
    codec: PacketCodec,
    buf: BytesMut,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn recv(&mut self) -> Result<Option<Packet>> {
        loop {
            // Drain buffered frames before touching the stream again; one
            // WebSocket message may carry several packets.
            if let Some(packet) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(packet));
            }

            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => self.buf.extend_from_slice(&data),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(other)) => {
                    trace!(kind = %message_kind(&other), "ignoring non-binary message");
                }
                Some(Err(e)) => return Err(GateError::WebSocketError(e.to_string())),
            }
        }
    }
}

/// Sending half: one binary WebSocket message per packet.
pub struct WsWriter {
    inner: SplitSink<WebSocketStream<TcpStream>, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send(&mut self, packet: Packet) -> Result<()> {
        self.inner
            .send(Message::Binary(packet.data().to_vec()))
            .await
            .map_err(|e| GateError::WebSocketError(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.inner
            .send(Message::Close(None))
            .await
            .map_err(|e| GateError::WebSocketError(e.to_string()))?;
        self.inner
            .close()
            .await
            .map_err(|e| GateError::WebSocketError(e.to_string()))
    }
}

fn message_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
