//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay engine and startup produce:
//!     → logging.rs (structured log events, per-connection spans)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Nothing in the relay path depends on observability output
//! - Metric calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
