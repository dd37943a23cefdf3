//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → startup builds TLS config, listener and backend address from it
//! ```
//!
//! # Design Decisions
//! - Config is read once; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    BackendConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
