//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_retry_attempts_total` (counter): scheduled retries
//! - `resilience_retry_exhausted_total` (counter): calls that ran out of retries
//! - `resilience_breaker_transitions_total` (counter): by breaker, from, to
//! - `resilience_breaker_rejections_total` (counter): fast-fails by breaker
//! - `resilience_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - Prometheus exposition only in the binary, via `init_metrics`

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_retry_attempt() {
    counter!("resilience_retry_attempts_total").increment(1);
}

pub fn record_retry_exhausted() {
    counter!("resilience_retry_exhausted_total").increment(1);
}

pub fn record_breaker_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "resilience_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("resilience_breaker_state", "breaker" => breaker.to_string()).set(state_value(to));
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!("resilience_breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    }
}
