//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (sessions, requests, admission, accept errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `route_server_sessions_total` (counter): accepted sessions
//! - `route_server_active_sessions` (gauge): live sessions
//! - `route_server_session_end_total` (counter): ended sessions by reason
//! - `route_server_requests_total` (counter): dispatched requests by route, status
//! - `route_server_request_duration_seconds` (histogram): dispatch latency by route
//! - `route_server_admission_total` (counter): admission outcomes
//! - `route_server_admission_evicted_total` (counter): records dropped by the sweeper
//! - `route_server_accept_errors_total` (counter): accept failures by kind
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Unknown route names share one label to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_session_opened() {
    counter!("route_server_sessions_total").increment(1);
    gauge!("route_server_active_sessions").increment(1.0);
}

pub fn record_session_closed() {
    gauge!("route_server_active_sessions").decrement(1.0);
}

pub fn record_session_end(reason: &'static str) {
    counter!("route_server_session_end_total", "reason" => reason).increment(1);
}

/// `route` must come from the route table (or a fixed placeholder), never raw client input.
pub fn record_request(route: &str, status: &'static str, start: Instant) {
    counter!("route_server_requests_total", "route" => route.to_string(), "status" => status)
        .increment(1);
    histogram!("route_server_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_admission(outcome: &'static str) {
    counter!("route_server_admission_total", "outcome" => outcome).increment(1);
}

pub fn record_admission_evicted(count: usize) {
    counter!("route_server_admission_evicted_total").increment(count as u64);
}

pub fn record_accept_error(kind: &'static str) {
    counter!("route_server_accept_errors_total", "kind" => kind).increment(1);
}
