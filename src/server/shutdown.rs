//! Shutdown coordination for the server lifecycle.
//!
//! [`ShutdownSignal`] is a phase broadcast: the accept loop moves it to
//! `Draining` when the shutdown future resolves, connection tasks wake up and
//! close their clients, and the server marks it `Stopped` once every task
//! has finished or the drain timeout forced them down.

use std::sync::Arc;
use tokio::sync::watch;

/// Phases of a graceful server shutdown.
///
/// Shutdown proceeds through these phases in order:
/// 1. [`Running`](ShutdownPhase::Running): normal operation
/// 2. [`Draining`](ShutdownPhase::Draining): stopped accepting, closing open connections
/// 3. [`Stopped`](ShutdownPhase::Stopped): all connection tasks finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Normal operation: accepting connections and processing frames.
    Running,
    /// Stopped accepting new connections; open ones are being closed.
    Draining,
    /// Every connection task finished.
    Stopped,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Broadcast signal for server shutdown coordination.
///
/// Clones share the same phase.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<ShutdownPhase>>,
}

impl ShutdownSignal {
    /// Creates a new shutdown signal in the [`Running`](ShutdownPhase::Running) phase.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownPhase::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current shutdown phase.
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        *self.tx.borrow()
    }

    /// Returns `true` if the server is in the draining phase.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.phase() == ShutdownPhase::Draining
    }

    /// Returns `true` if shutdown has been initiated (draining or later).
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.phase() != ShutdownPhase::Running
    }

    /// Returns `true` if the server has fully stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.phase() == ShutdownPhase::Stopped
    }

    /// Transitions from `Running` to `Draining`.
    ///
    /// Returns `false` if shutdown was already initiated.
    pub fn begin_drain(&self) -> bool {
        self.tx.send_if_modified(|phase| {
            if *phase == ShutdownPhase::Running {
                *phase = ShutdownPhase::Draining;
                true
            } else {
                false
            }
        })
    }

    /// Marks the server as fully stopped.
    pub fn mark_stopped(&self) {
        self.tx.send_replace(ShutdownPhase::Stopped);
    }

    /// Resolves once shutdown has been initiated.
    ///
    /// Returns immediately if it already has.
    pub async fn draining(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = rx
            .wait_for(|phase| *phase != ShutdownPhase::Running)
            .await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("phase", &self.phase())
            .finish()
    }
}
