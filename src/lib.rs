//! # GateNet
//!
//! Connection and session engine for multiplayer-game backends.
//!
//! GateNet accepts TCP and WebSocket connections, frames a length-prefixed
//! binary protocol, performs a key-check handshake, keeps connections alive
//! with heartbeats, and hands decoded application packets to a registered
//! handler. One session per connection, one id per session, a hard cap on
//! concurrent connections, and containment of every per-connection failure
//! inside that connection.
//!
//! ## Layers
//! - [`core`]: packet format, incremental frame codec, size-classed buffer pool
//! - [`protocol`]: handshake/heartbeat control messages, atomic lifecycle state
//! - [`transport`]: TCP, TLS, and WebSocket transports behind uniform traits
//! - [`session`]: the per-connection state machine, session lifecycle, manager
//! - [`server`] / [`client`]: the accepting front end and the connecting peer
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use gatenet::{GateConfig, GateServer, MessageHandler, Packet, Session};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl MessageHandler for Echo {
//!     async fn on_message(&self, session: &Arc<Session>, packet: Packet) {
//!         let _ = session.send_data(packet.id(), packet.body());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> gatenet::Result<()> {
//!     let config = GateConfig::default();
//!     let server = GateServer::new(config, Arc::new(Echo));
//!     server.run_until_shutdown().await
//! }
//! ```
//!
//! ## Wire Format
//! ```text
//! [MessageId(2, LE)] [BodyLength(4, LE)] [Body(N)]
//! ```
//! Message ids below 16 are internal (handshake, heartbeat); everything at
//! or above is routed to the application handler untouched.

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod utils;

pub use crate::client::GateClient;
pub use crate::config::{GateConfig, LoggingConfig, ServerConfig, TransportConfig};
pub use crate::core::codec::PacketCodec;
pub use crate::core::packet::{Packet, HEADER_LEN};
pub use crate::core::pool::BufferPool;
pub use crate::error::{GateError, Result};
pub use crate::protocol::message::{is_control, ControlMessage, CONTROL_ID_MAX};
pub use crate::protocol::state::ConnState;
pub use crate::server::GateServer;
pub use crate::session::{MessageHandler, Session, SessionManager, SessionState};
