//! Startup error taxonomy.
//!
//! Everything here is fatal: the process logs it and exits non-zero. Errors
//! on individual connections are [`crate::net::RelayError`] and never surface
//! past their task.

use crate::config::ConfigError;
use crate::net::{ListenerError, TlsError};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Certificate, key or CA material could not be loaded.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Listen address unavailable or TLS config rejected.
    #[error("failed creating listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("failed resolving remote address {addr:?}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed installing metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}
