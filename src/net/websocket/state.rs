//! Per-connection protocol state.
//!
//! ```text
//! AwaitingUpgrade ──101 written──▶ Open ──close frame──▶ Closing ──echo──▶ Closed
//!        │                          │                                        ▲
//!        └──────── aborted ─────────┴──── error / end of stream / timeout ───┘
//! ```
//!
//! Transitions are linear; `Closed` is terminal. The state sits behind a
//! mutex so that every task holding a [`StateHandle`] observes a single,
//! consistent transition to `Closed`.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// The upgrade request has not been answered yet.
    #[default]
    AwaitingUpgrade,
    /// Handshake complete; frames flow in both directions.
    Open,
    /// A close frame was sent or received; waiting for the other side.
    Closing,
    /// Terminal state. No frames are processed.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is open for data.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the close handshake is in progress.
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::Closing)
    }

    /// Check if the connection reached its terminal state.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingUpgrade, Self::Open | Self::Closed)
                | (Self::Open, Self::Closing | Self::Closed)
                | (Self::Closing, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingUpgrade => "awaiting-upgrade",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    /// State at the time of the attempt.
    pub from: ConnectionState,
    /// Requested state.
    pub to: ConnectionState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid connection state transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Shared, mutex-guarded connection state.
///
/// Cloning the handle shares the underlying state.
#[derive(Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<ConnectionState>>,
}

impl StateHandle {
    /// Creates a handle in [`ConnectionState::AwaitingUpgrade`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> ConnectionState {
        *self.inner.lock()
    }

    /// Moves to `next` if the transition is allowed.
    pub fn transition(&self, next: ConnectionState) -> Result<(), InvalidTransition> {
        let mut state = self.inner.lock();
        if !state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// `AwaitingUpgrade → Open`. Returns false if the state was different.
    pub fn open(&self) -> bool {
        self.transition(ConnectionState::Open).is_ok()
    }

    /// `Open → Closing`. Returns false if the connection was not open.
    pub fn begin_closing(&self) -> bool {
        self.transition(ConnectionState::Closing).is_ok()
    }

    /// Moves to `Closed` from any state and returns the previous state.
    pub fn close(&self) -> ConnectionState {
        std::mem::replace(&mut *self.inner.lock(), ConnectionState::Closed)
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateHandle").field(&self.get()).finish()
    }
}
