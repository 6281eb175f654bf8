//! Shared utilities for integration testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use resilience_core::resilience::{CircuitBreakerConfig, Classify, RetryConfig, TransportError};

/// One scripted response from a [`ScriptedDependency`].
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Step {
    Ok(&'static str),
    Fail(TransportError),
    /// Respond after sleeping.
    Slow(Duration, &'static str),
}

/// A fake dependency that plays back a script, then keeps repeating
/// `fallback` once the script runs out.
pub struct ScriptedDependency {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU32,
}

#[allow(dead_code)]
impl ScriptedDependency {
    pub fn new(script: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    /// Always fails with `error`.
    pub fn down(error: TransportError) -> Self {
        Self::new([], Step::Fail(error))
    }

    /// Always answers `body`.
    pub fn healthy(body: &'static str) -> Self {
        Self::new([], Step::Ok(body))
    }

    pub async fn call(&self) -> Result<&'static str, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Ok(body) => Ok(body),
            Step::Fail(error) => Err(error),
            Step::Slow(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Retry policy without jitter so elapsed time is exact under a paused clock.
#[allow(dead_code)]
pub fn exact_retry<E: Classify + 'static>(max_retries: u32, initial_ms: u64) -> RetryConfig<E> {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(initial_ms),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
        jitter: false,
        per_attempt_timeout: Duration::from_secs(5),
        ..RetryConfig::default()
    }
}

#[allow(dead_code)]
pub fn breaker_config(
    failure_threshold: u32,
    reset_ms: u64,
    success_threshold: u32,
) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        reset_timeout: Duration::from_millis(reset_ms),
        success_threshold,
        per_call_timeout: Duration::from_secs(5),
    }
}
