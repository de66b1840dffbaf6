//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Host transport call (fd)
//!     → transport.rs (resolve session in the worker's pool, drive rustls)
//!     → socket.rs (recv/send/close on the raw descriptor)
//!     → error.rs (Transfer / TransportError back to the host)
//!
//! Descriptor States:
//!     Unbound → Active (handshaking, then established) → Released → Active ...
//! ```
//!
//! # Design Decisions
//! - The host keeps its own descriptors; this layer never owns a socket
//!   except to close it in `close`
//! - Every call is synchronous and non-blocking-aware; nothing awaits

pub mod error;
pub mod socket;
pub mod transport;

pub use error::{Transfer, TransportError};
pub use transport::{TlsTransport, BUFFER_SIZE};
