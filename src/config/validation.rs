//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate address shapes and value ranges
//! - Check the certificate/key pair is complete
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - File contents are not inspected here; TLS loading reports those at startup

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration before it is used to start the proxy.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(message) = check_host_port(&config.listener.bind_address) {
        errors.push(ValidationError::new("listener.bind_address", message));
    }

    if config.backend.address.is_empty() {
        errors.push(ValidationError::new("backend.address", "is required"));
    } else if let Err(message) = check_host_port(&config.backend.address) {
        errors.push(ValidationError::new("backend.address", message));
    }

    let identity = config.tls.identity();
    match (identity.cert_file(), identity.key_file()) {
        (Some(_), Some(_)) => {}
        (None, None) => errors.push(ValidationError::new(
            "tls",
            "cert_file and key_file are required",
        )),
        _ => errors.push(ValidationError::new(
            "tls",
            format!("cert_file and key_file must both be present ({identity})"),
        )),
    }

    if config.timeouts.deadline_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.deadline_secs",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a non-empty host and a numeric port. Hosts are resolved later.
fn check_host_port(address: &str) -> Result<(), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("{address:?} is missing a port"))?;
    if host.is_empty() {
        return Err(format!("{address:?} is missing a host"));
    }
    port.parse::<u16>()
        .map(|_| ())
        .map_err(|_| format!("{address:?} has an invalid port"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backend.address = "127.0.0.1:9000".into();
        config.tls.cert_file = Some("server.pem".into());
        config.tls.key_file = Some("server-key.pem".into());
        config
    }

    fn fields(config: &ProxyConfig) -> Vec<&'static str> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn accepts_complete_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn accepts_hostnames_and_ipv6() {
        let mut config = valid();
        config.listener.bind_address = "[::1]:0".into();
        config.backend.address = "backend.internal:9000".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn default_config_reports_every_problem() {
        let fields = fields(&ProxyConfig::default());
        assert_eq!(fields, vec!["backend.address", "tls"]);
    }

    #[test]
    fn rejects_half_a_key_pair() {
        let mut config = valid();
        config.tls.key_file = None;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("server.pem"));
    }

    #[test]
    fn rejects_bad_addresses() {
        let mut config = valid();
        config.listener.bind_address = "0.0.0.0".into();
        config.backend.address = ":9000".into();
        assert_eq!(fields(&config), vec!["listener.bind_address", "backend.address"]);

        config.listener.bind_address = "0.0.0.0:http".into();
        config.backend.address = "127.0.0.1:9000".into();
        assert_eq!(fields(&config), vec!["listener.bind_address"]);
    }

    #[test]
    fn rejects_zero_deadline() {
        let mut config = valid();
        config.timeouts.deadline_secs = 0;
        assert_eq!(fields(&config), vec!["timeouts.deadline_secs"]);
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = valid();
        config.observability.metrics_address = "nowhere".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.observability.metrics_enabled = true;
        assert_eq!(fields(&config), vec!["observability.metrics_address"]);
    }
}
