//! Retry logic.
//!
//! # Responsibilities
//! - Invoke an operation up to `max_retries + 1` times
//! - Race every attempt against `per_attempt_timeout`
//! - Consult the classifier, then sleep for the backoff delay between attempts
//!
//! # Design Decisions
//! - Stateless across invocations: each call owns its attempt counter
//! - A non-retryable error ends the loop on the spot
//! - Jittered backoff prevents thundering herd
//! - `on_retry` is a side channel; a panicking hook is logged and ignored
//! - No cancellation token: drop the returned future to abort

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::RetrySettings;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_delay;
use crate::resilience::classify::{is_retryable_error, Classify};
use crate::resilience::error::ResilienceError;
use crate::resilience::timeouts::run_with_timeout;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Decides whether a failed attempt is worth another try.
pub type RetryPredicate<E> = Arc<dyn Fn(&ResilienceError<E>) -> bool + Send + Sync>;

/// Observes a scheduled retry: `(error, attempt_number, delay)`.
pub type RetryHook<E> = Arc<dyn Fn(&ResilienceError<E>, u32, Duration) + Send + Sync>;

/// Retry configuration for one call (or a family of calls).
///
/// Override only what you need and take the rest from the defaults:
///
/// ```
/// use std::time::Duration;
/// use resilience_core::resilience::retries::RetryConfig;
/// use resilience_core::resilience::error::TransportError;
///
/// let config = RetryConfig::<TransportError> {
///     max_retries: 5,
///     initial_delay: Duration::from_millis(50),
///     ..RetryConfig::default()
/// };
/// assert_eq!(config.total_attempts(), 6);
/// ```
pub struct RetryConfig<E> {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub per_attempt_timeout: Duration,
    /// Replaces the default classifier when set through [`RetryConfig::with_classifier`].
    pub is_retryable: RetryPredicate<E>,
    pub on_retry: Option<RetryHook<E>>,
}

impl<E> RetryConfig<E> {
    /// Default timings with an explicit classifier. This is the entry point
    /// for error types that do not implement [`Classify`].
    pub fn new<P>(classifier: P) -> Self
    where
        P: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            is_retryable: Arc::new(classifier),
            on_retry: None,
        }
    }

    /// Replace the classifier. No merging with the previous policy.
    pub fn with_classifier<P>(mut self, classifier: P) -> Self
    where
        P: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(classifier);
        self
    }

    /// Install an observability hook called before every backoff sleep.
    pub fn with_on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&ResilienceError<E>, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Take timings from validated settings, keeping classifier and hook.
    pub fn apply_settings(mut self, settings: &RetrySettings) -> Self {
        self.max_retries = settings.max_retries;
        self.initial_delay = Duration::from_millis(settings.initial_delay_ms);
        self.max_delay = Duration::from_millis(settings.max_delay_ms);
        self.backoff_multiplier = settings.backoff_multiplier;
        self.jitter = settings.jitter;
        self.per_attempt_timeout = Duration::from_millis(settings.per_attempt_timeout_ms);
        self
    }
}

impl<E: Classify + 'static> RetryConfig<E> {
    /// Build from validated settings with the default classifier.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::default().apply_settings(settings)
    }
}

impl<E: Classify + 'static> Default for RetryConfig<E> {
    fn default() -> Self {
        Self::new(|error| is_retryable_error(error))
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            per_attempt_timeout: self.per_attempt_timeout,
            is_retryable: self.is_retryable.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("per_attempt_timeout", &self.per_attempt_timeout)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

/// Run `operation` until it succeeds, fails terminally, or runs out of
/// attempts. The error returned is always the last one observed.
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig<E>,
) -> Result<T, ResilienceError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        let error = match run_with_timeout(config.per_attempt_timeout, operation()).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retrying");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !(config.is_retryable)(&error) {
            tracing::debug!(attempt = attempt + 1, error = %error, "Error is not retryable");
            return Err(error);
        }

        if attempt >= config.max_retries {
            metrics::record_retry_exhausted();
            tracing::warn!(
                attempts = attempt + 1,
                error = %error,
                "Retries exhausted"
            );
            return Err(error);
        }

        let delay = calculate_delay(attempt, config);
        notify_retry(config, &error, attempt + 1, delay);

        tracing::warn!(
            attempt = attempt + 1,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after error"
        );
        metrics::record_retry_attempt();

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn notify_retry<E>(
    config: &RetryConfig<E>,
    error: &ResilienceError<E>,
    attempt: u32,
    delay: Duration,
) {
    let Some(hook) = &config.on_retry else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| hook(error, attempt, delay))).is_err() {
        tracing::warn!(attempt, "on_retry hook panicked, continuing");
    }
}

/// An operation bundled with its retry configuration.
pub struct Retryable<F, E> {
    operation: F,
    config: RetryConfig<E>,
}

impl<F, E> Retryable<F, E> {
    /// Call the wrapped operation with `args`, retrying per the bundled
    /// config. `args` is cloned for every attempt.
    pub async fn call<A, Fut, T>(&self, args: A) -> Result<T, ResilienceError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        A: Clone,
        E: fmt::Display,
    {
        with_retry(|| (self.operation)(args.clone()), &self.config).await
    }

    pub fn config(&self) -> &RetryConfig<E> {
        &self.config
    }
}

/// Wrap `operation` so every call goes through [`with_retry`].
pub fn create_retryable<F, E>(operation: F, config: RetryConfig<E>) -> Retryable<F, E> {
    Retryable { operation, config }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::error::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn fast_config(max_retries: u32) -> RetryConfig<TransportError> {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: false,
            per_attempt_timeout: Duration::from_secs(1),
            ..RetryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let hook_calls = Arc::new(AtomicU32::new(0));
        let hc = hook_calls.clone();
        let config = fast_config(3).with_on_retry(move |_, _, _| {
            hc.fetch_add(1, Ordering::SeqCst);
        });

        let start = Instant::now();
        let result = with_retry(|| async { Ok::<_, TransportError>("ok") }, &config).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_single_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = fast_config(5);

        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::status(404, "not found"))
            },
            &config,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.unwrap_err().into_operation(),
            Some(TransportError::status(404, "not found"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_n_plus_one_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = fast_config(3);

        let start = Instant::now();
        let result: Result<(), _> = with_retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(TransportError::status(503, format!("attempt {n}")))
            },
            &config,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            result.unwrap_err().into_operation(),
            Some(TransportError::status(503, "attempt 4"))
        );
        // 100 + 200 + 400, no trailing delay
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_one_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::ConnectionRefused)
            },
            &fast_config(0),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_third_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TransportError::ConnectionReset)
                } else {
                    Ok(42)
                }
            },
            &fast_config(3),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = RetryConfig {
            per_attempt_timeout: Duration::from_millis(100),
            ..fast_config(2)
        };

        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            &config,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier_replaces_default() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = fast_config(2).with_classifier(|_| true);

        let _ = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransportError::status(400, "bad request"))
            },
            &config,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // and the other way: a normally retryable error becomes terminal
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = fast_config(2).with_classifier(|_| false);
        let _ = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransportError::ConnectionRefused)
            },
            &config,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_sees_attempt_and_delay() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let config = fast_config(3).with_on_retry(move |err, attempt, delay| {
            log.lock().unwrap().push((err.to_string(), attempt, delay));
        });

        let _ = with_retry(|| async { Err::<(), _>(TransportError::TimedOut) }, &config).await;

        let seen = seen.lock().unwrap();
        let attempts: Vec<_> = seen.iter().map(|(_, a, d)| (*a, *d)).collect();
        assert_eq!(
            attempts,
            vec![
                (1, Duration::from_millis(100)),
                (2, Duration::from_millis(200)),
                (3, Duration::from_millis(400)),
            ]
        );
        assert!(seen.iter().all(|(msg, _, _)| msg == "connection timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_hook_does_not_abort() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = fast_config(2).with_on_retry(|_, _, _| panic!("hook blew up"));

        let result = with_retry(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TransportError::ConnectionRefused)
                } else {
                    Ok("recovered")
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), "recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retryable_passes_arguments() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let fetch_user = create_retryable(
            move |id: u64| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TransportError::status(502, "bad gateway"))
                    } else {
                        Ok(format!("user-{id}"))
                    }
                }
            },
            fast_config(1),
        );

        assert_eq!(fetch_user.call(17).await.unwrap(), "user-17");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetch_user.config().max_retries, 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = RetrySettings {
            max_retries: 7,
            initial_delay_ms: 20,
            max_delay_ms: 500,
            backoff_multiplier: 3.0,
            jitter: false,
            per_attempt_timeout_ms: 1500,
        };
        let config = RetryConfig::<TransportError>::from_settings(&settings);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.initial_delay, Duration::from_millis(20));
        assert_eq!(config.max_delay, Duration::from_millis(500));
        assert_eq!(config.per_attempt_timeout, Duration::from_millis(1500));
        assert!(!config.jitter);
        assert!((config.is_retryable)(&ResilienceError::Operation(TransportError::TimedOut)));
    }
}
