//! Echo server: accepts TCP and WebSocket clients and echoes every
//! application packet back to its sender.
//!
//! ```sh
//! cargo run --example echo_server
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use gatenet::utils::logging;
use gatenet::{GateConfig, GateServer, MessageHandler, Packet, Session};
use tracing::info;

struct Echo;

#[async_trait]
impl MessageHandler for Echo {
    async fn on_message(&self, session: &Arc<Session>, packet: Packet) {
        info!(
            session_id = session.id(),
            id = packet.id(),
            bytes = packet.body_len(),
            "echoing packet"
        );
        let _ = session.send_data(packet.id(), packet.body());
    }
}

#[tokio::main]
async fn main() -> gatenet::Result<()> {
    let config = GateConfig::default_with_overrides(|c| {
        c.server.tcp_address = Some("127.0.0.1:7350".into());
        c.server.ws_address = Some("127.0.0.1:7351".into());
        c.server.heartbeat_interval = std::time::Duration::from_secs(10);
    });
    logging::init(&config.logging)?;

    let server = GateServer::new(config, Arc::new(Echo));
    server.run_until_shutdown().await
}
