//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! retries.rs / circuit_breaker.rs produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or pretty)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Breaker name is a label on every breaker metric
//! - Metrics are cheap and optional

pub mod logging;
pub mod metrics;
