//! Bookkeeping for sockets the listener has accepted.
//!
//! [`ConnectionManager::admit`] hands out a [`ConnectionGuard`] per accepted
//! socket, or refuses it when the connection limit is reached or shutdown
//! has begun. The guard records what the socket turned into (a plain HTTP
//! exchange or a WebSocket, whose state stays observable) and removes the
//! entry when the connection task ends.

use crate::net::websocket::{ConnectionState, StateHandle};
use crate::server::shutdown::ShutdownSignal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Identifier of an admitted connection, unique per server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What an admitted socket is being used for.
#[derive(Debug, Clone)]
pub enum ConnectionKind {
    /// The request head has not been read yet.
    Pending,
    /// A plain HTTP request that gets one response.
    Http,
    /// An upgraded WebSocket.
    WebSocket(StateHandle),
}

/// Metadata for an admitted connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote peer address.
    pub peer: SocketAddr,
    /// When the socket was accepted.
    pub accepted_at: Instant,
    /// What the socket turned into.
    pub kind: ConnectionKind,
}

impl ConnectionInfo {
    /// State of the WebSocket carried by this connection, if it upgraded.
    #[must_use]
    pub fn websocket_state(&self) -> Option<ConnectionState> {
        match &self.kind {
            ConnectionKind::WebSocket(state) => Some(state.get()),
            ConnectionKind::Pending | ConnectionKind::Http => None,
        }
    }
}

/// Why [`ConnectionManager::admit`] turned a socket away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The connection limit is reached.
    AtCapacity,
    /// The server is draining or stopped.
    ShuttingDown,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtCapacity => write!(f, "connection limit reached"),
            Self::ShuttingDown => write!(f, "server is shutting down"),
        }
    }
}

/// Counters over the lifetime of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Connections currently admitted.
    pub active: usize,
    /// Admitted connections whose WebSocket is open.
    pub open_websockets: usize,
    /// Highest `active` seen.
    pub peak: usize,
    /// Connections admitted in total.
    pub admitted: u64,
    /// Connections refused in total.
    pub refused: u64,
}

#[derive(Default)]
struct Table {
    live: HashMap<ConnectionId, ConnectionInfo>,
    next_id: u64,
    peak: usize,
    admitted: u64,
    refused: u64,
}

/// Admits connections up to an optional limit and tracks the live ones.
pub struct ConnectionManager {
    table: Arc<Mutex<Table>>,
    limit: Option<usize>,
    shutdown: ShutdownSignal,
}

impl ConnectionManager {
    /// Creates a manager. A `limit` of `None` admits any number of
    /// connections.
    #[must_use]
    pub fn new(limit: Option<usize>, shutdown: ShutdownSignal) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            limit,
            shutdown,
        }
    }

    /// Admits the socket accepted from `peer`.
    pub fn admit(&self, peer: SocketAddr) -> Result<ConnectionGuard, Refusal> {
        let mut table = self.table.lock();
        let refusal = if self.shutdown.is_shutting_down() {
            Some(Refusal::ShuttingDown)
        } else if self.limit.is_some_and(|max| table.live.len() >= max) {
            Some(Refusal::AtCapacity)
        } else {
            None
        };
        if let Some(refusal) = refusal {
            table.refused += 1;
            return Err(refusal);
        }

        table.next_id += 1;
        let id = ConnectionId(table.next_id);
        table.live.insert(
            id,
            ConnectionInfo {
                peer,
                accepted_at: Instant::now(),
                kind: ConnectionKind::Pending,
            },
        );
        table.admitted += 1;
        table.peak = table.peak.max(table.live.len());

        Ok(ConnectionGuard {
            id,
            table: Arc::clone(&self.table),
        })
    }

    /// Number of connections currently admitted.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.table.lock().live.len()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        let table = self.table.lock();
        let open_websockets = table
            .live
            .values()
            .filter(|info| info.websocket_state().is_some_and(ConnectionState::is_open))
            .count();
        ConnectionStats {
            active: table.live.len(),
            open_websockets,
            peak: table.peak,
            admitted: table.admitted,
            refused: table.refused,
        }
    }

    /// Snapshot of the live connections, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ConnectionId, ConnectionInfo)> {
        let mut live: Vec<_> = self
            .table
            .lock()
            .live
            .iter()
            .map(|(id, info)| (*id, info.clone()))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live
    }

    /// The configured connection limit.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("stats", &self.stats())
            .field("limit", &self.limit)
            .field("phase", &self.shutdown.phase())
            .finish()
    }
}

/// Keeps a connection admitted until dropped.
pub struct ConnectionGuard {
    id: ConnectionId,
    table: Arc<Mutex<Table>>,
}

impl ConnectionGuard {
    /// Returns the connection ID.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Records that the socket carries a plain HTTP request.
    pub fn mark_http(&self) {
        self.set_kind(ConnectionKind::Http);
    }

    /// Records that the socket upgraded; `state` follows the WebSocket.
    pub fn mark_websocket(&self, state: StateHandle) {
        self.set_kind(ConnectionKind::WebSocket(state));
    }

    fn set_kind(&self, kind: ConnectionKind) {
        if let Some(info) = self.table.lock().live.get_mut(&self.id) {
            info.kind = kind;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.table.lock().live.remove(&self.id);
    }
}

impl fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
