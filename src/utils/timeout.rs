//! Async timeout helpers and shared timing constants.

use crate::error::{GateError, Result};
use std::future::Future;
use std::time::Duration;

/// Default timeout for individual network operations (handshake steps,
/// client connects).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default heartbeat interval. The receive-timeout window is always twice
/// the configured heartbeat.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for graceful server shutdown. Connections that have not
/// drained by then are abandoned rather than blocking process exit.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a future with a timeout, mapping expiry to `GateError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(GateError::Timeout),
    }
}
