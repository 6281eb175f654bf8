//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: trial calls test whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed since the last failure (checked lazily on access)
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any trial failure
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, each with its own mutex
//! - The eligibility check and the transition it triggers run under one lock
//! - The lock is never held across an await, nor while logging or recording metrics
//! - Half-Open admits every caller; a short burst of trial calls is tolerated
//! - A per-call timeout counts as a failure; the late result is dropped

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::schema::BreakerSettings;
use crate::observability::metrics;
use crate::resilience::error::ResilienceError;
use crate::resilience::timeouts::run_with_timeout;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// Minimum time open before a trial call is admitted.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes needed to close.
    pub success_threshold: u32,
    pub per_call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 3,
            per_call_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_settings(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
            success_threshold: settings.success_threshold,
            per_call_timeout: Duration::from_millis(settings.per_call_timeout_ms),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub ms_since_last_failure: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }
}

/// A state change, reported after the lock is released.
#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    failures: u32,
}

/// A named guard around one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// Fails fast with [`ResilienceError::CircuitOpen`] without calling
    /// `operation` while open. Otherwise the outcome is recorded and the
    /// operation's value or error is handed back unchanged.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.acquire() {
            return Err(ResilienceError::CircuitOpen {
                name: self.name.clone(),
                retry_after,
            });
        }

        let result = run_with_timeout(self.config.per_call_timeout, operation()).await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Eligibility check without running anything. A `false` counts as a
    /// rejection, so pair every `true` with `record_success` or
    /// `record_failure`.
    pub fn allow_request(&self) -> bool {
        self.acquire().is_ok()
    }

    /// Current state, after applying the time-based Open → Half-Open check.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        let change = self.refresh(&mut inner, Instant::now());
        let state = inner.state;
        drop(inner);

        self.announce(change);
        state
    }

    pub fn stats(&self) -> BreakerStats {
        let mut inner = self.lock();
        let now = Instant::now();
        let change = self.refresh(&mut inner, now);
        let stats = BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            ms_since_last_failure: inner
                .last_failure
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
        };
        drop(inner);

        self.announce(change);
        stats
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;

        let change = match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                inner.failure_count = 0;
                if inner.success_count >= self.config.success_threshold {
                    inner.success_count = 0;
                    Self::transition(&mut inner, CircuitState::Closed)
                } else {
                    None
                }
            }
            // Admitted before the breaker tripped; the trip stands.
            CircuitState::Open => None,
        };
        drop(inner);

        self.announce(change);
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.last_failure = Some(Instant::now());

        let change = match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    Self::transition(&mut inner, CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => Self::transition(&mut inner, CircuitState::Open),
            CircuitState::Open => None,
        };
        drop(inner);

        self.announce(change);
    }

    /// Force Closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        let change = Self::transition(&mut inner, CircuitState::Closed);
        drop(inner);

        self.announce(change);
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Force Open, starting a fresh cooldown.
    pub fn trip(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        let change = Self::transition(&mut inner, CircuitState::Open);
        drop(inner);

        self.announce(change);
        tracing::warn!(breaker = %self.name, "Circuit breaker tripped manually");
    }

    /// Ok when the call may proceed, otherwise the remaining cooldown.
    fn acquire(&self) -> Result<(), Duration> {
        let mut inner = self.lock();
        let now = Instant::now();
        let change = self.refresh(&mut inner, now);

        if inner.state != CircuitState::Open {
            drop(inner);
            self.announce(change);
            return Ok(());
        }

        inner.total_rejections += 1;
        let retry_after = self.cooldown_remaining(&inner, now);
        drop(inner);

        metrics::record_breaker_rejection(&self.name);
        tracing::debug!(
            breaker = %self.name,
            retry_after_ms = retry_after.as_millis() as u64,
            "Circuit open, rejecting call"
        );
        Err(retry_after)
    }

    fn refresh(&self, inner: &mut BreakerInner, now: Instant) -> Option<Transition> {
        if inner.state == CircuitState::Open && self.cooldown_remaining(inner, now).is_zero() {
            inner.success_count = 0;
            return Self::transition(inner, CircuitState::HalfOpen);
        }
        None
    }

    fn cooldown_remaining(&self, inner: &BreakerInner, now: Instant) -> Duration {
        match inner.last_failure {
            Some(at) => self
                .config
                .reset_timeout
                .saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }

    /// Change state under the lock. The caller reports the returned
    /// transition through [`CircuitBreaker::announce`] once the guard is gone.
    fn transition(inner: &mut BreakerInner, to: CircuitState) -> Option<Transition> {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        Some(Transition {
            from,
            to,
            failures: inner.failure_count,
        })
    }

    fn announce(&self, change: Option<Transition>) {
        let Some(Transition { from, to, failures }) = change else {
            return;
        };
        metrics::record_breaker_transition(&self.name, from, to);

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = from.as_str(),
                failures,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::debug!(
                breaker = %self.name,
                "Circuit breaker half-open, admitting trial calls"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %self.name,
                from = from.as_str(),
                "Circuit breaker closed"
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Every critical section leaves the state consistent, so a panic in
        // another holder does not invalidate it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Factory for a named breaker.
pub fn create_circuit_breaker(
    name: impl Into<String>,
    config: CircuitBreakerConfig,
) -> CircuitBreaker {
    CircuitBreaker::new(name, config)
}
