//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lifecycle_state` (gauge): 0=created, 1=running, 2=draining, 3=stopped
//! - `lifecycle_processor_failures_total` (counter): failing processors by phase
//! - `lifecycle_drain_duration_seconds` (histogram): time from shutdown signal to drained
//! - `lifecycle_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder it is a no-op
//! - The Prometheus exporter is opt-in

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::lifecycle::State;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_state(state: State) {
    let value = match state {
        State::Created => 0.0,
        State::Running => 1.0,
        State::Draining => 2.0,
        State::Stopped => 3.0,
    };
    gauge!("lifecycle_state").set(value);
}

pub fn record_processor_failures(phase: &'static str, count: usize) {
    if count > 0 {
        counter!("lifecycle_processor_failures_total", "phase" => phase).increment(count as u64);
    }
}

pub fn record_drain_duration(started: Instant) {
    histogram!("lifecycle_drain_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    gauge!("lifecycle_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("lifecycle_active_connections").decrement(1.0);
}
