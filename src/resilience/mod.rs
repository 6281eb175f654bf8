//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → retries.rs (attempt loop)
//!         → timeouts.rs (per-attempt deadline)
//!         → classify.rs (transient or terminal?)
//!         → backoff.rs (how long to wait)
//!     → circuit_breaker.rs (track outcomes, fail fast while open)
//!         → registry.rs (one breaker per named dependency)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every guarded call has a deadline
//! - Retry and circuit breaking compose in either order
//! - Synthesized failures (timeout, circuit open) are enum variants, not strings
//! - All state is per process; nothing is persisted or shared across instances

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod error;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use backoff::{calculate_delay, calculate_delay_with_rng};
pub use circuit_breaker::{
    create_circuit_breaker, BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use classify::{is_retryable_error, is_retryable_status, Classify, FailureClass};
pub use error::{ResilienceError, TransportError};
pub use registry::BreakerRegistry;
pub use retries::{create_retryable, with_retry, RetryConfig, Retryable};
