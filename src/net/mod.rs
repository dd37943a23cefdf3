//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, TLS acceptor)
//!     → relay.rs (per-connection task: handshake, backend dial, byte pumps)
//!     → connection.rs (connection IDs, state names, in-flight count)
//!
//! Connection States:
//!     Accepted → Dialing → Relaying → Closed
//! ```
//!
//! # Design Decisions
//! - tls.rs builds configs once at startup; they are shared read-only
//! - Every socket gets one absolute deadline when it is obtained
//! - A failed connection never affects the listener or other connections

pub mod connection;
pub mod listener;
pub mod relay;
pub mod tls;

pub use listener::{ListenerError, TlsListener};
pub use relay::{Relay, RelayConfig, RelayError};
pub use tls::{ClientAuth, ClientTlsConfig, Identity, ServerTlsConfig, TlsError, TrustPool};
