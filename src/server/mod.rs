//! TCP listener serving the WebSocket endpoint and the plain HTTP route.
//!
//! - [`Server`]: accept loop, one task per connection
//! - [`MessageHandler`]: application hook for received text
//! - [`ShutdownSignal`]: shutdown state machine (Running → Draining → Stopped)
//! - [`ConnectionManager`]: active connection tracking with capacity limits
//!
//! # Architecture
//!
//! ```text
//! Server::run_until
//! │
//! ├── accept loop (stops when the shutdown future resolves)
//! │
//! └── connection tasks (tracked by ConnectionManager)
//!     ├── upgrade → Connection::accept → recv loop → MessageHandler
//!     └── plain HTTP → 200 "Hello!" / 404, then close
//! ```
//!
//! # Example
//!
//! ```no_run
//! use textws::config::ServerConfig;
//! use textws::server::{EchoHandler, Server};
//!
//! # async fn run() -> textws::Result<()> {
//! let server = Server::bind(ServerConfig::default())
//!     .await?
//!     .with_handler(EchoHandler);
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod connection;
pub mod handler;
pub mod http;
pub mod shutdown;

pub use connection::{
    ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionKind, ConnectionManager,
    ConnectionStats, Refusal,
};
pub use handler::{EchoHandler, LogHandler, MessageHandler};
pub use shutdown::{ShutdownPhase, ShutdownSignal};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::net::websocket::{self, CloseReason, Connection, ConnectionConfig, Message};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Shared, read-only state handed to every connection task.
struct ConnectionContext {
    config: Arc<ServerConfig>,
    connection: ConnectionConfig,
    handler: Arc<dyn MessageHandler>,
    shutdown: ShutdownSignal,
}

/// A bound WebSocket server.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    handler: Arc<dyn MessageHandler>,
    shutdown: ShutdownSignal,
    connections: Arc<ConnectionManager>,
}

impl Server {
    /// Binds the listener on `config.bind`.
    ///
    /// The handler defaults to [`EchoHandler`] when `config.echo` is set and
    /// to [`LogHandler`] otherwise.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        let handler: Arc<dyn MessageHandler> = if config.echo {
            Arc::new(EchoHandler)
        } else {
            Arc::new(LogHandler)
        };
        let shutdown = ShutdownSignal::new();
        let connections = Arc::new(ConnectionManager::new(
            config.max_connections,
            shutdown.clone(),
        ));

        Ok(Self {
            listener,
            config: Arc::new(config),
            handler,
            shutdown,
            connections,
        })
    }

    /// Replaces the message handler.
    #[must_use]
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the configuration the server runs with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns a handle to the shutdown signal.
    ///
    /// Calling [`ShutdownSignal::begin_drain`] on it stops the server like
    /// the shutdown future passed to [`run_until`](Self::run_until) does.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Returns the connection tracker.
    #[must_use]
    pub fn connections(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.connections)
    }

    /// Serves until the process is killed.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Shutdown stops the accept loop, sends a going-away close to every
    /// open WebSocket client and waits up to the configured drain timeout
    /// for connection tasks to finish before aborting the rest.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr()?, "listening");

        let ctx = Arc::new(ConnectionContext {
            config: Arc::clone(&self.config),
            connection: self.config.connection_config(),
            handler: Arc::clone(&self.handler),
            shutdown: self.shutdown.clone(),
        });
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = self.shutdown.draining() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let guard = match self.connections.admit(peer) {
                        Ok(guard) => guard,
                        Err(refusal) => {
                            tracing::warn!(peer = %peer, reason = %refusal, "connection refused");
                            if refusal == Refusal::AtCapacity {
                                let _ = stream.try_write(&websocket::reject(503, "Service Unavailable"));
                            }
                            continue;
                        }
                    };

                    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
                    let ctx = Arc::clone(&ctx);
                    tasks.spawn(
                        async move {
                            if let Err(err) = serve_connection(stream, peer, &guard, &ctx).await {
                                tracing::warn!(error = %err, "connection failed");
                            }
                        }
                        .instrument(span),
                    );
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            tracing::error!(error = %err, "connection task panicked");
                        }
                    }
                }
            }
        }

        self.shutdown.begin_drain();
        let stats = self.connections.stats();
        tracing::info!(
            active = stats.active,
            open_websockets = stats.open_websockets,
            "shutting down"
        );

        let drain_timeout = self.config.drain_timeout;
        let drained = tokio::time::timeout(drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                timeout_ms = drain_timeout.as_millis(),
                "drain timeout elapsed, aborting connections"
            );
            tasks.shutdown().await;
        }

        self.shutdown.mark_stopped();
        let stats = self.connections.stats();
        tracing::info!(
            admitted = stats.admitted,
            refused = stats.refused,
            peak = stats.peak,
            "server stopped"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("connections", &self.connections)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    guard: &ConnectionGuard,
    ctx: &ConnectionContext,
) -> Result<()> {
    let Some(head) = http::read_request_head(&mut stream, ctx.config.max_header_bytes).await?
    else {
        tracing::debug!("closed before sending a request");
        return Ok(());
    };

    if !head.request.is_upgrade() {
        guard.mark_http();
        tracing::debug!(
            method = %head.request.method,
            path = %head.request.path,
            "plain http request"
        );
        let response = http::plain_response(&head.request, &ctx.config.allowed_origin);
        stream.write_all(&response).await?;
        stream.shutdown().await?;
        return Ok(());
    }

    let mut conn = Connection::accept(&head.request, stream, &ctx.connection)
        .await?
        .with_buffered(&head.leftover);
    guard.mark_websocket(conn.state());
    tracing::info!("websocket connection open");

    loop {
        // A cancelled `recv` leaves any half-written frame to `close`.
        let next = if ctx.shutdown.is_draining() {
            None
        } else {
            tokio::select! {
                msg = conn.recv() => Some(msg),
                () = ctx.shutdown.draining() => None,
            }
        };
        let Some(msg) = next else {
            conn.close(CloseReason::going_away()).await?;
            break;
        };

        match msg? {
            Some(Message::Text(text)) => {
                if let Some(reply) = ctx.handler.on_text(peer, &text) {
                    conn.send_text(&reply).await?;
                }
            }
            Some(Message::Close(reason)) => {
                tracing::debug!(
                    code = ?reason.as_ref().and_then(|r| r.code),
                    "client closed connection"
                );
            }
            None => break,
        }
    }

    tracing::info!("websocket connection closed");
    Ok(())
}
