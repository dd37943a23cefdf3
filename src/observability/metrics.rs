//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_accept_errors_total` (counter)
//! - `proxy_handshake_failures_total` (counter)
//! - `proxy_backend_dial_failures_total` (counter)
//! - `proxy_connections_closed_total` (counter): by `reason`
//! - `proxy_bytes_total` (counter): by `direction`, counted when a pump finishes
//! - `proxy_active_connections` (gauge)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_accepted() {
    counter!("proxy_connections_accepted_total").increment(1);
}

pub fn accept_failed() {
    counter!("proxy_accept_errors_total").increment(1);
}

pub fn handshake_failed() {
    counter!("proxy_handshake_failures_total").increment(1);
}

pub fn dial_failed() {
    counter!("proxy_backend_dial_failures_total").increment(1);
}

pub fn connection_closed(reason: &'static str) {
    counter!("proxy_connections_closed_total", "reason" => reason).increment(1);
}

pub fn bytes_relayed(direction: &'static str, bytes: u64) {
    counter!("proxy_bytes_total", "direction" => direction).increment(bytes);
}

pub fn connection_opened() {
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_released() {
    gauge!("proxy_active_connections").decrement(1.0);
}
