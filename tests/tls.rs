#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! TLS transport: the same framed handshake flow over a TLS-wrapped TCP
//! listener, using a generated self-signed certificate trusted by the test
//! client.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gatenet::protocol::message::{ControlMessage, HANDSHAKE_OK, MSG_HEARTBEAT};
use gatenet::transport::tls::TlsServerSettings;
use gatenet::{GateConfig, GateServer, MessageHandler, Packet, PacketCodec, Session};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;

struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn on_message(&self, session: &Arc<Session>, packet: Packet) {
        let _ = session.send_data(packet.id(), packet.body());
    }
}

#[tokio::test]
async fn tls_listener_handshakes_and_echoes() {
    let dir = std::env::temp_dir();
    let cert_path = dir.join("gatenet_tls_it_cert.pem");
    let key_path = dir.join("gatenet_tls_it_key.pem");
    TlsServerSettings::generate_self_signed(&cert_path, &key_path).unwrap();

    let config = GateConfig::default_with_overrides(|c| {
        c.server.tcp_address = Some("127.0.0.1:0".into());
        c.server.heartbeat_interval = Duration::from_secs(2);
        c.server.shutdown_timeout = Duration::from_secs(1);
        c.transport.tls_cert_path = Some(cert_path.to_string_lossy().into_owned());
        c.transport.tls_key_path = Some(key_path.to_string_lossy().into_owned());
    });
    let server = GateServer::new(config, Arc::new(EchoHandler));
    server.run().await.unwrap();
    let addr = server.tcp_addr().unwrap();

    // Trust the generated certificate directly.
    let mut roots = rustls::RootCertStore::empty();
    let cert_file = File::open(&cert_path).unwrap();
    for der in rustls_pemfile::certs(&mut BufReader::new(cert_file)).unwrap() {
        roots.add(&rustls::Certificate(der)).unwrap();
    }
    let client_config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));

    let tcp = TcpStream::connect(addr).await.unwrap();
    let server_name = rustls::ServerName::try_from("localhost").unwrap();
    let tls = connector.connect(server_name, tcp).await.unwrap();
    let mut framed = Framed::new(tls, PacketCodec::default());

    framed
        .send(ControlMessage::HandshakeRequest { key: String::new() }.encode())
        .await
        .unwrap();
    let mut response = framed.next().await.unwrap().unwrap();
    assert!(matches!(
        ControlMessage::decode(&mut response).unwrap(),
        ControlMessage::HandshakeResponse {
            code: HANDSHAKE_OK,
            ..
        }
    ));
    framed
        .send(ControlMessage::HandshakeAck.encode())
        .await
        .unwrap();

    let mut app = Packet::new(900);
    app.append_str("secure");
    framed.send(app).await.unwrap();

    let echoed = loop {
        let packet = framed.next().await.unwrap().unwrap();
        if packet.id() != MSG_HEARTBEAT {
            break packet;
        }
    };
    assert_eq!(echoed.id(), 900);

    server.stop().await;
    std::fs::remove_file(cert_path).ok();
    std::fs::remove_file(key_path).ok();
}
