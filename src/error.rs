//! # Error Types
//!
//! Comprehensive error handling for the connection engine.
//!
//! This module defines all error variants that can occur during transport,
//! framing, and session operations, from low-level I/O errors to high-level
//! protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Network failures on the underlying stream
//! - **Framing Errors**: Invalid headers, oversized bodies, malformed payloads
//! - **Handshake Errors**: Key mismatch, unexpected packets before completion
//! - **Lifecycle Errors**: Invalid state transitions, liveness timeouts
//! - **Admission Errors**: Connection-limit rejection
//! - **TLS Errors**: Certificate and secure-transport issues
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! A partial frame is never an error: the codec reports "need more data" by
//! returning `Ok(None)` and the caller simply reads again.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Framing errors
    pub const ERR_INVALID_HEADER: &str = "Invalid frame header";
    pub const ERR_OVERSIZED_BODY: &str = "Frame body exceeds maximum length";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_CONNECTION_TIMEOUT: &str = "Connection timed out (no inbound traffic)";
    pub const ERR_TIMEOUT: &str = "Operation timed out";
    pub const ERR_SEND_QUEUE_CLOSED: &str = "Send queue closed";

    /// Handshake errors
    pub const ERR_KEY_MISMATCH: &str = "Handshake key mismatch";
    pub const ERR_HANDSHAKE_REQUIRED: &str = "Application packet before handshake completion";
    pub const ERR_HANDSHAKE_REJECTED: &str = "Handshake rejected by peer";

    /// Lifecycle errors
    pub const ERR_ALREADY_RUNNING: &str = "Component is already running";
    pub const ERR_NOT_RUNNING: &str = "Component is not running";
    pub const ERR_AT_CAPACITY: &str = "Connection limit reached";
}

/// Primary error type for all connection-engine operations.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out (no inbound traffic)")]
    ConnectionTimeout,

    #[error("Operation timed out")]
    Timeout,

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Frame body too large: {declared} bytes (max {max})")]
    OversizedBody { declared: usize, max: usize },

    #[error("Malformed packet body: {0}")]
    MalformedBody(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Handshake key mismatch")]
    KeyMismatch,

    #[error("Unexpected packet id {id} in state {state}")]
    UnexpectedPacket { id: u16, state: &'static str },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Connection limit reached: {max}")]
    AtCapacity { max: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl GateError {
    /// Whether this error came from the remote peer misbehaving, as opposed
    /// to a local fault. Protocol violations close the connection but are
    /// never escalated past the owning session.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            GateError::InvalidHeader
                | GateError::OversizedBody { .. }
                | GateError::MalformedBody(_)
                | GateError::UnexpectedPacket { .. }
                | GateError::KeyMismatch
        )
    }
}

/// Type alias for Results using GateError
pub type Result<T> = std::result::Result<T, GateError>;
