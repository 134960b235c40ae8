//! # Transports
//!
//! Byte-stream transports beneath the frame codec, unified behind
//! object-safe reader/writer traits so TCP, TLS-over-TCP, and WebSocket
//! connections are interchangeable above the accept layer.
//!
//! ## Responsibilities
//! - Split a duplex stream into an owned read half and write half
//! - Provide the ordered, queue-fed send path ([`socket::Socket`])
//! - Offer a uniform [`Acceptor`] contract for the listener loops

pub mod socket;
pub mod tcp;
pub mod tls;
pub mod websocket;

use std::net::SocketAddr;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::Result;

/// Receiving half of a framed transport.
#[async_trait]
pub trait FrameReader: Send {
    /// Next complete packet. `Ok(None)` is a clean remote close; partial
    /// frames never surface here, the codec holds them until complete.
    async fn recv(&mut self) -> Result<Option<Packet>>;
}

/// Sending half of a framed transport.
#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, packet: Packet) -> Result<()>;
    /// Flush and close the underlying stream.
    async fn close(&mut self) -> Result<()>;
}

/// Uniform listener contract. `accept_raw` hands back the raw TCP stream so
/// the accept loop can apply admission control before paying for the
/// transport upgrade; `upgrade` (TLS handshake, WebSocket upgrade, or plain
/// framing) runs on the per-connection task.
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept_raw(&self) -> std::io::Result<(TcpStream, SocketAddr)>;
    async fn upgrade(
        &self,
        stream: TcpStream,
    ) -> Result<(Box<dyn FrameReader>, Box<dyn FrameWriter>)>;
    fn local_addr(&self) -> SocketAddr;
    fn scheme(&self) -> &'static str;
}

/// Read half of any `AsyncRead + AsyncWrite` stream under the packet codec.
pub struct StreamReader<T> {
    inner: SplitStream<Framed<T, PacketCodec>>,
}

/// Write half of any `AsyncRead + AsyncWrite` stream under the packet codec.
pub struct StreamWriter<T> {
    inner: SplitSink<Framed<T, PacketCodec>, Packet>,
}

/// Frame a duplex stream and split it into owned halves.
pub fn split_stream<T>(
    io: T,
    max_body_len: usize,
    read_buffer_size: usize,
) -> (StreamReader<T>, StreamWriter<T>)
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let framed = Framed::with_capacity(io, PacketCodec::new(max_body_len), read_buffer_size);
    let (sink, stream) = framed.split();
    (StreamReader { inner: stream }, StreamWriter { inner: sink })
}

#[async_trait]
impl<T> FrameReader for StreamReader<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn recv(&mut self) -> Result<Option<Packet>> {
        self.inner.next().await.transpose()
    }
}

#[async_trait]
impl<T> FrameWriter for StreamWriter<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&mut self, packet: Packet) -> Result<()> {
        self.inner.send(packet).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn split_halves_roundtrip_over_duplex() {
        let (a, b) = tokio::io::duplex(256);
        let (_reader_a, mut writer_a) = split_stream(a, 1024, 256);
        let (mut reader_b, _writer_b) = split_stream(b, 1024, 256);

        let mut p = Packet::new(77);
        p.append_str("ping");
        writer_a.send(p).await.unwrap();

        let mut got = reader_b.recv().await.unwrap().unwrap();
        assert_eq!(got.id(), 77);
        assert_eq!(got.read_str().unwrap(), "ping");
    }

    #[tokio::test]
    async fn close_surfaces_as_clean_end_of_stream() {
        let (a, b) = tokio::io::duplex(256);
        let (_reader_a, mut writer_a) = split_stream(a, 1024, 256);
        let (mut reader_b, _writer_b) = split_stream(b, 1024, 256);

        writer_a.close().await.unwrap();
        assert!(reader_b.recv().await.unwrap().is_none());
    }
}
