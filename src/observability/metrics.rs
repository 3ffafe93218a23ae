//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_publish_total` (counter): publish attempts by outcome
//! - `gateway_reload_failures_total` (counter): reloads that failed on every path
//! - `gateway_compiled_backends` (gauge): backends in the last compiled document
//! - `gateway_grants_created_total` (counter): grants by kind
//! - `gateway_grants_swept_total` (counter): expired grants removed
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality (no slugs or subject ids)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_publish(outcome: &'static str) {
    counter!("gateway_publish_total", "outcome" => outcome).increment(1);
}

pub fn record_reload_failure() {
    counter!("gateway_reload_failures_total").increment(1);
}

pub fn record_compiled_backends(count: usize) {
    gauge!("gateway_compiled_backends").set(count as f64);
}

pub fn record_grant_created(kind: &'static str) {
    counter!("gateway_grants_created_total", "kind" => kind).increment(1);
}

pub fn record_grants_swept(count: usize) {
    counter!("gateway_grants_swept_total").increment(count as u64);
}
