//! TLS-wrapping TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Build the rustls acceptor from the server TLS config
//! - Accept raw TCP connections; the handshake runs later in the connection task
//!
//! Accepting never waits on a handshake, so one stalled client cannot hold up
//! the accept loop.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use super::tls::{ServerTlsConfig, TlsError};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The server TLS configuration was rejected.
    Tls(TlsError),
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Tls(e) => write!(f, "Invalid TLS configuration: {}", e),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Tls(e) => Some(e),
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
        }
    }
}

/// A TCP listener paired with the TLS acceptor for its connections.
pub struct TlsListener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Shared, immutable server TLS state.
    acceptor: TlsAcceptor,
}

impl TlsListener {
    /// Bind `bind_address` (`host:port`) and prepare TLS with `tls`.
    pub async fn bind(bind_address: &str, tls: &ServerTlsConfig) -> Result<Self, ListenerError> {
        let server_config = tls.to_rustls().map_err(ListenerError::Tls)?;

        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            mutual_tls = tls.client_auth().requires_client_cert(),
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            acceptor: TlsAcceptor::from(server_config),
        })
    }

    /// Accept the next TCP connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Acceptor used to run the TLS handshake on accepted streams.
    pub fn acceptor(&self) -> TlsAcceptor {
        self.acceptor.clone()
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}
