//! Relay engine: accept loop and per-connection forwarding.
//!
//! # Responsibilities
//! - Accept TLS connections and hand each to its own task
//! - Dial the fixed backend over plain TCP
//! - Copy bytes both ways until either direction ends
//! - Enforce the fixed per-socket deadline and release both sockets
//!
//! # Design Decisions
//! - Deadlines are absolute: set once when a socket is obtained, never renewed.
//!   A busy connection is cut off at the deadline just like an idle one.
//! - No retries anywhere; a failed step closes the connection.
//! - Accept errors are logged and the loop continues without backoff.
//! - Connection tasks are detached; nothing waits for them to finish.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, Instrument};

use super::connection::{ConnectionState, ConnectionTracker};
use super::listener::TlsListener;
use crate::observability::metrics;

/// Lifetime of each socket, measured from accept (inbound) or dial (outbound).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Direction of one byte pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to backend.
    ToBackend,
    /// Backend to client.
    ToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToBackend => "to_backend",
            Direction::ToClient => "to_client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection task ended early. Never escapes the task.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("failed dialing backend {backend}: {source}")]
    Dial {
        backend: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("copy {direction} failed: {source}")]
    Copy {
        direction: Direction,
        #[source]
        source: io::Error,
    },

    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(ConnectionState),
}

impl RelayError {
    /// Short label used for the close-reason metric.
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::Handshake(_) => "handshake",
            RelayError::Dial { .. } => "dial",
            RelayError::Copy { .. } => "copy",
            RelayError::DeadlineExceeded(_) => "deadline",
        }
    }
}

/// A relay that ended because one direction reached end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// The pump that finished first.
    pub first_closed: Direction,
    /// Bytes that pump moved.
    pub bytes: u64,
}

/// Settings shared read-only by every connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Resolved backend address.
    pub backend: SocketAddr,
    /// Absolute lifetime of each socket.
    pub deadline: Duration,
}

impl RelayConfig {
    pub fn new(backend: SocketAddr) -> Self {
        Self {
            backend,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Accepts TLS connections and relays each one to the backend.
pub struct Relay {
    listener: TlsListener,
    config: RelayConfig,
    tracker: ConnectionTracker,
}

impl Relay {
    pub fn new(listener: TlsListener, config: RelayConfig) -> Self {
        Self {
            listener,
            config,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Handle on the in-flight connection count.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run the accept loop. Only returns when the future is dropped.
    pub async fn run(self) {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    metrics::accept_failed();
                    error!(error = %e, "Failed to accept incoming connection");
                    continue;
                }
            };

            // The inbound deadline covers the handshake too.
            let inbound_deadline = Instant::now() + self.config.deadline;
            metrics::connection_accepted();

            let guard = self.tracker.track();
            let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer_addr);
            let acceptor = self.listener.acceptor();
            let config = self.config;

            tokio::spawn(
                async move {
                    match handle_connection(stream, acceptor, config, inbound_deadline).await {
                        Ok(outcome) => {
                            metrics::connection_closed("eof");
                            debug!(
                                first_closed = %outcome.first_closed,
                                bytes = outcome.bytes,
                                "Relay finished"
                            );
                        }
                        Err(e) => {
                            metrics::connection_closed(e.reason());
                            match &e {
                                RelayError::Dial { .. } => {
                                    error!(error = %e, "Failed dialing remote address")
                                }
                                RelayError::Handshake(_) => debug!(error = %e, "Handshake failed"),
                                _ => info!(error = %e, "Relay terminated"),
                            }
                        }
                    }
                    drop(guard);
                }
                .instrument(span),
            );
        }
    }
}

/// Drive one connection through Accepted → Dialing → Relaying → Closed.
async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    config: RelayConfig,
    inbound_deadline: Instant,
) -> Result<RelayOutcome, RelayError> {
    let inbound = within(inbound_deadline, ConnectionState::Accepted, acceptor.accept(stream))
        .await?
        .map_err(|e| {
            metrics::handshake_failed();
            RelayError::Handshake(e)
        })?;

    let dialed = within(
        inbound_deadline,
        ConnectionState::Dialing,
        TcpStream::connect(config.backend),
    )
    .await
    .and_then(|r| {
        r.map_err(|source| RelayError::Dial {
            backend: config.backend,
            source,
        })
    });
    let outbound = match dialed {
        Ok(outbound) => outbound,
        Err(e) => {
            metrics::dial_failed();
            close_inbound(inbound, inbound_deadline).await;
            return Err(e);
        }
    };
    let outbound_deadline = Instant::now() + config.deadline;

    info!(
        local_addr = ?outbound.local_addr().ok(),
        backend = %config.backend,
        "Established proxy"
    );

    // Each socket carries its own deadline; the pair lives until the earlier one.
    let result = relay(inbound, outbound, inbound_deadline.min(outbound_deadline)).await;

    info!(backend = %config.backend, "Closing proxy");
    result
}

/// Copy both ways until one direction ends, then close both sockets.
async fn relay(
    inbound: TlsStream<TcpStream>,
    mut outbound: TcpStream,
    deadline: Instant,
) -> Result<RelayOutcome, RelayError> {
    let (mut client_read, mut client_write) = tokio::io::split(inbound);

    let result = {
        let (mut backend_read, mut backend_write) = outbound.split();
        let pumps = async {
            tokio::select! {
                r = tokio::io::copy(&mut client_read, &mut backend_write) => finish(Direction::ToBackend, r),
                r = tokio::io::copy(&mut backend_read, &mut client_write) => finish(Direction::ToClient, r),
            }
        };
        within(deadline, ConnectionState::Relaying, pumps)
            .await
            .and_then(|r| r)
    };

    close_inbound(client_read.unsplit(client_write), deadline).await;
    // outbound drops here
    result
}

fn finish(direction: Direction, copied: io::Result<u64>) -> Result<RelayOutcome, RelayError> {
    match copied {
        Ok(bytes) => {
            metrics::bytes_relayed(direction.as_str(), bytes);
            Ok(RelayOutcome {
                first_closed: direction,
                bytes,
            })
        }
        Err(source) => Err(RelayError::Copy { direction, source }),
    }
}

/// Send close_notify if the deadline allows, then drop the socket.
async fn close_inbound(mut inbound: TlsStream<TcpStream>, deadline: Instant) {
    match timeout_at(deadline, inbound.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Inbound shutdown failed"),
        Err(_) => debug!("Inbound shutdown cut off by deadline"),
    }
}

async fn within<F: Future>(
    deadline: Instant,
    state: ConnectionState,
    fut: F,
) -> Result<F::Output, RelayError> {
    timeout_at(deadline, fut)
        .await
        .map_err(|_| RelayError::DeadlineExceeded(state))
}
