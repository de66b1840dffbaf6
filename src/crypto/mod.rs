//! Randomness for the TLS layer.
//!
//! # Data Flow
//! ```text
//! OS entropy
//!     → EntropySource (process-wide, one mutex, periodic OS reseed)
//!     → Drbg (one per worker thread, seeded and reseeded from the source)
//!     → ThreadRandom (rustls SecureRandom reading the calling thread's Drbg)
//!     → handshakes run on that worker thread
//! ```
//!
//! # Design Decisions
//! - The shared source is only touched to seed or reseed a thread generator
//! - rustls takes a `&'static dyn SecureRandom`, so the per-thread generator
//!   lives in a thread-local installed by the worker's context

pub mod drbg;
pub mod entropy;

pub use drbg::{worker_provider, Drbg, DrbgError, DrbgGuard, ThreadRandom, THREAD_RANDOM};
pub use entropy::EntropySource;
