//! TLS network layer for a worker-per-thread server.
//!
//! Redirects a host's plain socket calls (read, write, writev, sendfile,
//! close) through a rustls session bound to the same descriptor.

// Host surface
pub mod plugin;

// Core subsystems
pub mod credentials;
pub mod crypto;
pub mod net;
pub mod session;
pub mod worker;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::PluginConfig;
pub use net::{TlsTransport, Transfer, TransportError};
pub use plugin::{Capabilities, InitError, NetworkLayer, TlsPlugin};
pub use session::SessionCache;
pub use worker::ThreadContext;
