//! Resilience primitives for calls to unreliable dependencies.
//!
//! - [`resilience::with_retry`]: retry with exponential backoff and jitter
//! - [`resilience::CircuitBreaker`]: fail fast while a dependency is down
//! - [`resilience::BreakerRegistry`]: one breaker per named dependency
//!
//! Settings come from [`config`]; logs and metrics from [`observability`].

pub mod config;
pub mod observability;
pub mod resilience;

pub use config::schema::ResilienceSettings;
pub use resilience::{
    create_circuit_breaker, create_retryable, with_retry, BreakerRegistry, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, ResilienceError, RetryConfig,
};
