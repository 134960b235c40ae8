//! Atomic lifecycle state machines.
//!
//! Connection and session lifecycles are both small tagged enums stored in a
//! single atomic byte and advanced only by compare-and-swap. An invalid
//! transition reports an error and leaves the state untouched; it is never a
//! crash and never a silent overwrite. A single cell rather than a set of
//! booleans rules out split-brain between independently flipped flags.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{GateError, Result};

/// A lifecycle enum storable in a [`StateCell`].
pub trait LifecycleState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn from_raw(raw: u8) -> Self;
    fn as_raw(self) -> u8;
    fn name(self) -> &'static str;
}

/// Handshake / connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// Freshly accepted, no handshake traffic yet.
    Init = 0,
    /// Handshake accepted, waiting for the client's acknowledgement.
    WaitAck = 1,
    /// Application traffic flows.
    Working = 2,
    /// Teardown in progress.
    Closing = 3,
    /// All I/O rejected.
    Closed = 4,
}

impl LifecycleState for ConnState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ConnState::Init,
            1 => ConnState::WaitAck,
            2 => ConnState::Working,
            3 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }

    fn as_raw(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            ConnState::Init => "INIT",
            ConnState::WaitAck => "WAIT_ACK",
            ConnState::Working => "WORKING",
            ConnState::Closing => "CLOSING",
            ConnState::Closed => "CLOSED",
        }
    }
}

/// Compare-and-swap guarded state holder.
pub struct StateCell<S> {
    raw: AtomicU8,
    _marker: PhantomData<S>,
}

impl<S: LifecycleState> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.as_raw()),
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> S {
        S::from_raw(self.raw.load(Ordering::Acquire))
    }

    pub fn is(&self, state: S) -> bool {
        self.get() == state
    }

    /// Move `from -> to` atomically. On contention or a wrong current state
    /// the cell is left untouched and the actual state is reported.
    pub fn transition(&self, from: S, to: S) -> Result<()> {
        self.raw
            .compare_exchange(
                from.as_raw(),
                to.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| GateError::InvalidTransition {
                from: S::from_raw(actual).name(),
                to: to.name(),
            })
    }

    /// Move to `to` from whichever of `from` currently holds. Returns the
    /// state that was left, or an error naming the actual state when none of
    /// the candidates matched.
    pub fn transition_from_any(&self, from: &[S], to: S) -> Result<S> {
        loop {
            let current = self.get();
            if !from.contains(&current) {
                return Err(GateError::InvalidTransition {
                    from: current.name(),
                    to: to.name(),
                });
            }
            if self
                .raw
                .compare_exchange(
                    current.as_raw(),
                    to.as_raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(current);
            }
        }
    }
}

impl<S: LifecycleState> fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&self.get()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn valid_transition_advances() {
        let cell = StateCell::new(ConnState::Init);
        cell.transition(ConnState::Init, ConnState::WaitAck).unwrap();
        assert_eq!(cell.get(), ConnState::WaitAck);
    }

    #[test]
    fn invalid_transition_is_reported_noop() {
        let cell = StateCell::new(ConnState::Init);
        let err = cell
            .transition(ConnState::WaitAck, ConnState::Working)
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::InvalidTransition {
                from: "INIT",
                to: "WORKING"
            }
        ));
        assert_eq!(cell.get(), ConnState::Init);
    }

    #[test]
    fn transition_from_any_reports_departed_state() {
        let cell = StateCell::new(ConnState::Working);
        let left = cell
            .transition_from_any(
                &[ConnState::Init, ConnState::WaitAck, ConnState::Working],
                ConnState::Closing,
            )
            .unwrap();
        assert_eq!(left, ConnState::Working);

        assert!(cell
            .transition_from_any(&[ConnState::Working], ConnState::Closing)
            .is_err());
    }

    #[test]
    fn concurrent_cas_has_exactly_one_winner() {
        let cell = Arc::new(StateCell::new(ConnState::Working));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            handles.push(std::thread::spawn(move || {
                cell.transition(ConnState::Working, ConnState::Closing).is_ok()
            }));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(cell.get(), ConnState::Closing);
    }
}
