//! Lifecycle management for the demo host.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → workers see the flag between accepts → teardown contexts
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger shutdown → plugin exit
//! ```
//!
//! # Design Decisions
//! - Workers are plain threads, so the shutdown signal is an atomic flag
//! - Only signal waiting uses an async runtime, on the main thread

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
