//! TLS session state.
//!
//! # Data Flow
//! ```text
//! worker thread
//!     → pool.rs (descriptor → slot → TlsSession, thread-owned)
//!     → rustls handshake
//!     → cache.rs (session id → resumption state, shared by all threads)
//! ```

pub mod cache;
pub mod pool;
pub mod tls;

pub use cache::{CacheStats, SessionCache};
pub use pool::{Binding, SessionPool, SlotId};
pub use tls::TlsSession;
