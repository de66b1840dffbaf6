//! Worker thread lifecycle.
//!
//! # Data Flow
//! ```text
//! worker_init()
//!     → context.rs (install generator, load key, build ServerConfig)
//!     → registry.rs (register entry)
//!     → worker serves connections through the transport hooks
//!
//! plugin_exit()
//!     → registry.rs (retire every entry)
//!     → each context drops its sessions on its next call, or on drop
//! ```

pub mod context;
pub mod registry;

pub use context::ThreadContext;
pub use registry::{ThreadRegistry, WorkerEntry};
