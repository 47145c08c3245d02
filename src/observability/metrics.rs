//! Metrics collection.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, admission outcomes)
//! - Track per-destination health and per-family throttling
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route family
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): throttled requests by route family
//! - `gateway_policy_decisions_total` (counter): policy outcomes by type, mode, verdict
//! - `gateway_output_cache_total` (counter): cache hit/miss/store/bypass
//! - `gateway_destination_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Emits through the `metrics` facade; no exporter is installed by the gateway,
//!   so calls are no-ops until the embedding process installs a recorder

use std::time::Instant;

use ::metrics::{counter, gauge, histogram};

use crate::policy::{PolicyMode, PolicyType};
use crate::routing::RouteFamily;

pub fn record_request(method: &str, status: u16, family: RouteFamily, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("family", family.as_str().to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", "family" => family.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(family: RouteFamily) {
    counter!("gateway_rate_limited_total", "family" => family.as_str()).increment(1);
}

pub fn record_policy_decision(policy_type: PolicyType, mode: PolicyMode, verdict: &'static str) {
    let mode = match mode {
        PolicyMode::Observe => "observe",
        PolicyMode::Enforce => "enforce",
    };
    counter!(
        "gateway_policy_decisions_total",
        "type" => policy_type.as_str(),
        "mode" => mode,
        "verdict" => verdict
    )
    .increment(1);
}

pub fn record_output_cache(outcome: &'static str) {
    counter!("gateway_output_cache_total", "outcome" => outcome).increment(1);
}

pub fn record_destination_health(address: &str, healthy: bool) {
    gauge!("gateway_destination_health", "destination" => address.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
