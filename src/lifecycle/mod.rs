//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build server TLS config → Bind listener → Resolve backend → Relay ready
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main returns, in-flight connections die with the process
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Steps run in order, not concurrently
//! - No drain on exit; the fixed deadline bounds every connection anyway

pub mod signals;
pub mod startup;

pub use startup::{resolve_backend, start};
