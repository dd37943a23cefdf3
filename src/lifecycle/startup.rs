//! Startup orchestration.
//!
//! Turns a validated [`ProxyConfig`] into a [`Relay`] that is bound and ready
//! to accept. The accept loop itself is started by the caller.

use std::net::SocketAddr;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::net::{Relay, RelayConfig, TlsListener};

/// Build the server TLS config, bind the listener and resolve the backend.
pub async fn start(config: &ProxyConfig) -> Result<Relay, ProxyError> {
    let identity = config.tls.identity();
    let server_tls = identity.server_config()?;

    let listener = TlsListener::bind(&config.listener.bind_address, &server_tls).await?;
    let backend = resolve_backend(&config.backend.address).await?;

    let relay = Relay::new(
        listener,
        RelayConfig::new(backend).with_deadline(config.timeouts.deadline()),
    );

    tracing::info!(
        bind_address = %config.listener.bind_address,
        local_addr = ?relay.local_addr().ok(),
        backend = %backend,
        deadline_secs = config.timeouts.deadline_secs,
        "Established proxy, waiting for connections"
    );

    Ok(relay)
}

/// Resolve `addr` once; the first address returned is used for every dial.
pub async fn resolve_backend(addr: &str) -> Result<SocketAddr, ProxyError> {
    let resolve_error = |source| ProxyError::Resolve {
        addr: addr.to_string(),
        source,
    };

    tokio::net::lookup_host(addr)
        .await
        .map_err(resolve_error)?
        .next()
        .ok_or_else(|| {
            resolve_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses found",
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_literal_addresses() {
        let addr = resolve_backend("127.0.0.1:9000").await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn missing_port_fails_to_resolve() {
        let err = resolve_backend("127.0.0.1").await.unwrap_err();
        assert!(matches!(err, ProxyError::Resolve { .. }));
    }

    #[tokio::test]
    async fn start_without_key_pair_fails_before_binding() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.backend.address = "127.0.0.1:9000".into();

        let err = start(&config).await.err().unwrap();
        assert!(matches!(err, ProxyError::Tls(_)), "{err}");
    }
}
