//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! credentials, session cache, pool, transport:
//!     → logging.rs (tracing subscriber; rustls `log` records bridged in)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, demo host only)
//! ```
//!
//! # Design Decisions
//! - Metric updates are cheap enough for the per-call I/O path
//! - Without an installed recorder every metric call is a no-op

pub mod logging;
pub mod metrics;
