//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, errors, connections)
//! - Expose Prometheus-compatible metrics endpoint
//! - Keep in-process totals for the admin API
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total exchanges by method and status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_upstream_errors_total` (counter): upstream failures by kind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - [`ProxyStats`] mirrors the totals so the admin API works without
//!   Prometheus

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;

/// Starts the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Methods reported under their own label. Anything else is `"other"`.
const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH", "CONNECT", "TRACE",
    "PROPFIND", "PROPPATCH", "MKCOL", "COPY", "MOVE", "LOCK", "UNLOCK", "REPORT", "MKACTIVITY",
    "CHECKOUT", "MERGE",
];

/// Maps a request method onto a bounded set of label values.
pub fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .copied()
        .find(|known| *known == method)
        .unwrap_or("other")
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method_label(method),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("proxy_active_connections").set(count as f64);
}

/// Process-wide request totals.
#[derive(Debug, Default)]
pub struct ProxyStats {
    connections: AtomicU64,
    requests: AtomicU64,
    forwarded: AtomicU64,
    not_found: AtomicU64,
    client_errors: AtomicU64,
    upstream_errors: AtomicU64,
    aborted: AtomicU64,
}

/// Outcome of one request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    NotFound,
    ClientError,
    UpstreamError,
    Aborted,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: Outcome) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Forwarded => &self.forwarded,
            Outcome::NotFound => &self.not_found,
            Outcome::ClientError => &self.client_errors,
            Outcome::UpstreamError => &self.upstream_errors,
            Outcome::Aborted => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_connections: u64) -> StatsSnapshot {
        StatsSnapshot {
            active_connections,
            total_connections: self.connections.load(Ordering::Relaxed),
            total_requests: self.requests.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub total_requests: u64,
    pub forwarded: u64,
    pub not_found: u64,
    pub client_errors: u64,
    pub upstream_errors: u64,
    pub aborted: u64,
}
