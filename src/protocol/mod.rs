//! # Control Protocol
//!
//! The internal sub-protocol that rides the same wire as application
//! traffic: handshake negotiation and heartbeats, plus the atomic state
//! machinery guarding connection and session lifecycles.
//!
//! Message ids below [`message::CONTROL_ID_MAX`] are reserved for this
//! module and never surface to application handlers.

pub mod message;
pub mod state;

pub use message::{is_control, ControlMessage};
pub use state::{ConnState, LifecycleState, StateCell};
