//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::tls::Identity;
use crate::observability::logging::LogFormat;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single backend every connection is relayed to.
    pub backend: BackendConfig,

    /// Certificate, key and CA files.
    pub tls: TlsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:39281").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:39281".to_string(),
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "127.0.0.1:9000"), resolved once at startup.
    pub address: String,
}

/// TLS file locations. Certificate and key are required together.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate chain (PEM).
    pub cert_file: Option<PathBuf>,

    /// Path to private key (PEM).
    pub key_file: Option<PathBuf>,

    /// Path to CA bundle (PEM). When set, clients must present a certificate
    /// signed by one of these CAs.
    pub ca_file: Option<PathBuf>,
}

impl TlsConfig {
    pub fn identity(&self) -> Identity {
        Identity::new(
            self.cert_file.clone(),
            self.key_file.clone(),
            self.ca_file.clone(),
        )
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Absolute lifetime of each socket in seconds, counted from accept or dial.
    pub deadline_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { deadline_secs: 5 }
    }
}

impl TimeoutConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_all_interfaces_with_five_second_deadline() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:39281");
        assert_eq!(config.timeouts.deadline(), Duration::from_secs(5));
        assert!(config.backend.address.is_empty());
        assert!(config.tls.identity().is_empty());
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [backend]
            address = "127.0.0.1:9000"

            [tls]
            cert_file = "server.pem"
            key_file = "server-key.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.address, "127.0.0.1:9000");
        assert_eq!(config.listener, ListenerConfig::default());
        assert_eq!(config.tls.ca_file, None);

        let identity = config.tls.identity();
        assert_eq!(identity.cert_file(), Some(std::path::Path::new("server.pem")));
        assert!(identity.ca_file().is_none());
    }
}
