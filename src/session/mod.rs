//! # Sessions
//!
//! The stateful binding between one accepted connection and the application
//! message handler: the handshake/heartbeat connection state machine, the
//! session lifecycle with its receive/flush/monitor tasks, and the manager
//! that tracks live sessions under the admission policy.

pub mod conn;
pub mod manager;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::packet::Packet;

pub use conn::Conn;
pub use manager::SessionManager;
pub use session::{Session, SessionState};

/// Application capability invoked for every application-level packet.
///
/// Dispatch is awaited inline on the session's receive task: a slow handler
/// back-pressures its own session only and never blocks other sessions.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, session: &Arc<Session>, packet: Packet);
}
