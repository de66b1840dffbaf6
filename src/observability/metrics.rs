//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tls_sessions_created_total` (counter): pool slots added
//! - `tls_sessions_reused_total` (counter): released slots rebound
//! - `tls_sessions_released_total` (counter): slots released on close
//! - `tls_pool_slots` (gauge): slots per worker, labelled `worker`
//! - `tls_session_cache_lookups_total` (counter): labelled `result` = hit | miss
//! - `tls_session_cache_evictions_total` (counter)
//! - `tls_io_errors_total` (counter): fatal per-call errors, labelled `op`
//! - `tls_credential_fallbacks_total` (counter): built-in material used, labelled `kind`

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub fn record_session_created() {
    counter!("tls_sessions_created_total").increment(1);
}

pub fn record_session_reused() {
    counter!("tls_sessions_reused_total").increment(1);
}

pub fn record_session_released() {
    counter!("tls_sessions_released_total").increment(1);
}

pub fn record_pool_slots(worker: u64, slots: usize) {
    gauge!("tls_pool_slots", "worker" => worker.to_string()).set(slots as f64);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("tls_session_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction() {
    counter!("tls_session_cache_evictions_total").increment(1);
}

pub fn record_io_error(op: &'static str) {
    counter!("tls_io_errors_total", "op" => op).increment(1);
}

pub fn record_credential_fallback(kind: &'static str) {
    counter!("tls_credential_fallbacks_total", "kind" => kind).increment(1);
}

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
