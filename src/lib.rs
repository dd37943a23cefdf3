//! TLS-terminating TCP proxy library.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use net::{Identity, Relay, RelayConfig, TlsListener};
