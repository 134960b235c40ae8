//! # Socket
//!
//! One accepted connection's read path and queued send path.
//!
//! Sends are asynchronous: [`PacketSender::send`] enqueues onto an unbounded
//! ordered queue and returns immediately. A dedicated flush task
//! ([`FlushLoop`]) drains the queue, writing each packet to the wire in
//! enqueue order. Queueing `None` is the sentinel that stops the flush task
//! and closes the sink; the receive path uses it to unwind the writer when
//! it detects connection loss.
//!
//! Heartbeats and application data share the queue, so a heartbeat is
//! flushed relative to other queued traffic in arrival order, not
//! prioritized.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::core::packet::Packet;
use crate::error::{GateError, Result};
use crate::transport::{FrameReader, FrameWriter};
use crate::utils::{ActivityClock, Metrics};

/// Cloneable handle onto a socket's send queue.
#[derive(Clone)]
pub struct PacketSender {
    tx: mpsc::UnboundedSender<Option<Packet>>,
    clock: Arc<ActivityClock>,
    metrics: Arc<Metrics>,
}

impl PacketSender {
    /// Enqueue a packet for ordered transmission. Returns immediately; the
    /// flush task writes it out. Fails only after the queue has closed.
    pub fn send(&self, packet: Packet) -> Result<()> {
        let wire_len = packet.data().len();
        self.tx
            .send(Some(packet))
            .map_err(|_| GateError::ConnectionClosed)?;
        self.clock.touch_send();
        self.metrics.packet_sent(wire_len);
        Ok(())
    }

    /// Enqueue the stop sentinel. Packets queued earlier still flush first.
    pub fn shutdown(&self) {
        let _ = self.tx.send(None);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One connection's framed read half plus its send queue.
pub struct Socket {
    reader: Box<dyn FrameReader>,
    sender: PacketSender,
    flush: Option<FlushLoop>,
    peer: SocketAddr,
    clock: Arc<ActivityClock>,
    metrics: Arc<Metrics>,
}

impl Socket {
    pub fn new(
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
        peer: SocketAddr,
        clock: Arc<ActivityClock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = PacketSender {
            tx,
            clock: clock.clone(),
            metrics: metrics.clone(),
        };
        Self {
            reader,
            sender,
            flush: Some(FlushLoop { rx, writer, peer }),
            peer,
            clock,
            metrics,
        }
    }

    /// Blocking receive of the next complete packet. Refreshes the activity
    /// clock on every packet, control or application.
    pub async fn recv(&mut self) -> Result<Option<Packet>> {
        match self.reader.recv().await? {
            Some(packet) => {
                self.clock.touch_recv();
                self.metrics.packet_received(packet.data().len());
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }

    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    /// The flush task body. Present until taken exactly once by whoever
    /// spawns the writer.
    pub fn take_flush_loop(&mut self) -> Option<FlushLoop> {
        self.flush.take()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn clock(&self) -> Arc<ActivityClock> {
        self.clock.clone()
    }
}

/// Drains the send queue to the wire in FIFO order.
pub struct FlushLoop {
    rx: mpsc::UnboundedReceiver<Option<Packet>>,
    writer: Box<dyn FrameWriter>,
    peer: SocketAddr,
}

impl FlushLoop {
    /// Run until the stop sentinel, a write failure, or all senders dropping,
    /// then close the sink.
    pub async fn run(mut self) {
        while let Some(item) = self.rx.recv().await {
            match item {
                Some(packet) => {
                    if let Err(e) = self.writer.send(packet).await {
                        debug!(peer = %self.peer, error = %e, "flush failed, stopping writer");
                        break;
                    }
                }
                None => break,
            }
        }
        self.rx.close();
        if let Err(e) = self.writer.close().await {
            trace!(peer = %self.peer, error = %e, "error closing sink");
        }
        trace!(peer = %self.peer, "writer stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::split_stream;

    fn test_socket(io: tokio::io::DuplexStream) -> Socket {
        let (reader, writer) = split_stream(io, 1024, 256);
        Socket::new(
            Box::new(reader),
            Box::new(writer),
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(ActivityClock::new()),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn queued_packets_flush_in_enqueue_order() {
        let (a, b) = tokio::io::duplex(4096);
        let mut socket = test_socket(a);
        let mut peer = test_socket(b);

        let sender = socket.sender();
        for i in 0..20u16 {
            sender.send(Packet::new(100 + i)).unwrap();
        }
        sender.shutdown();
        socket.take_flush_loop().unwrap().run().await;

        for i in 0..20u16 {
            let got = peer.recv().await.unwrap().unwrap();
            assert_eq!(got.id(), 100 + i);
        }
        assert!(peer.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sentinel_stops_writer_and_closes_sink() {
        let (a, b) = tokio::io::duplex(4096);
        let mut socket = test_socket(a);
        let mut peer = test_socket(b);

        let sender = socket.sender();
        let flush = tokio::spawn(socket.take_flush_loop().unwrap().run());
        sender.send(Packet::new(42)).unwrap();
        sender.shutdown();

        assert_eq!(peer.recv().await.unwrap().unwrap().id(), 42);
        assert!(peer.recv().await.unwrap().is_none());
        flush.await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_reports_connection_closed() {
        let (a, _b) = tokio::io::duplex(64);
        let mut socket = test_socket(a);
        let sender = socket.sender();
        sender.shutdown();
        socket.take_flush_loop().unwrap().run().await;
        drop(socket);

        assert!(matches!(
            sender.send(Packet::new(1)),
            Err(GateError::ConnectionClosed)
        ));
    }
}
