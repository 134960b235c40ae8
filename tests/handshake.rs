#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end handshake flows over real TCP: accepted keys, rejected keys,
//! and clients that try to skip the handshake entirely.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gatenet::core::codec::PacketCodec;
use gatenet::{
    GateClient, GateConfig, GateError, GateServer, MessageHandler, Packet, Session,
};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Records every application packet and echoes it back.
struct EchoHandler {
    seen: Mutex<Vec<(u16, Vec<u8>)>>,
}

impl EchoHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<(u16, Vec<u8>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn on_message(&self, session: &Arc<Session>, packet: Packet) {
        self.seen
            .lock()
            .unwrap()
            .push((packet.id(), packet.body().to_vec()));
        let _ = session.send_data(packet.id(), packet.body());
    }
}

async fn start_server(key: &str, max_connections: usize) -> (Arc<GateServer>, Arc<EchoHandler>, String) {
    let handler = EchoHandler::new();
    let config = GateConfig::default_with_overrides(|c| {
        c.server.tcp_address = Some("127.0.0.1:0".into());
        c.server.handshake_key = key.to_string();
        c.server.max_connections = max_connections;
        c.server.heartbeat_interval = Duration::from_secs(2);
        c.server.shutdown_timeout = Duration::from_secs(1);
    });
    let server = GateServer::new(config, handler.clone());
    server.run().await.unwrap();
    let addr = server.tcp_addr().unwrap().to_string();
    (server, handler, addr)
}

#[tokio::test]
async fn correct_key_reaches_working_and_echoes() {
    let (server, handler, addr) = start_server("sesame", 8).await;

    let mut client = GateClient::connect(&addr, "sesame").await.unwrap();
    assert_eq!(client.heartbeat_interval(), Duration::from_secs(2));

    client.send_data(100, b"hello").await.unwrap();
    let echoed = client.recv().await.unwrap().unwrap();
    assert_eq!(echoed.id(), 100);
    assert_eq!(echoed.body(), b"hello");

    assert_eq!(handler.seen(), vec![(100, b"hello".to_vec())]);
    server.stop().await;
}

#[tokio::test]
async fn wrong_key_is_rejected_with_explicit_failure() {
    let (server, handler, addr) = start_server("sesame", 8).await;

    let result = GateClient::connect(&addr, "open-barley").await;
    assert!(matches!(result, Err(GateError::HandshakeFailed(_))));

    // Rejection must be distinguishable from network loss and must never
    // reach the handler.
    assert!(handler.seen().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.manager().live(), 0);
    server.stop().await;
}

#[tokio::test]
async fn empty_server_key_accepts_anything() {
    let (server, _handler, addr) = start_server("", 8).await;

    let mut client = GateClient::connect(&addr, "whatever").await.unwrap();
    client.send_data(42, b"ok").await.unwrap();
    assert_eq!(client.recv().await.unwrap().unwrap().id(), 42);
    server.stop().await;
}

#[tokio::test]
async fn application_packet_before_handshake_closes_connection() {
    let (server, handler, addr) = start_server("sesame", 8).await;

    let stream = TcpStream::connect(&addr).await.unwrap();
    let mut framed = Framed::new(stream, PacketCodec::default());

    let mut packet = Packet::new(500);
    packet.append_str("sneaky");
    framed.send(packet).await.unwrap();

    // The server closes without ever dispatching.
    let eof = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match framed.next().await {
                None => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(eof.is_ok(), "server should close the connection");
    assert!(handler.seen().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.manager().live(), 0);
    server.stop().await;
}

#[tokio::test]
async fn two_packets_echo_in_order() {
    let (server, _handler, addr) = start_server("sesame", 8).await;

    let mut client = GateClient::connect(&addr, "sesame").await.unwrap();
    client.send_data(100, b"first").await.unwrap();
    client.send_data(101, b"second").await.unwrap();

    let a = client.recv().await.unwrap().unwrap();
    let b = client.recv().await.unwrap().unwrap();
    assert_eq!((a.id(), a.body()), (100, &b"first"[..]));
    assert_eq!((b.id(), b.body()), (101, &b"second"[..]));
    server.stop().await;
}
