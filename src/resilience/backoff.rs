//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

use crate::resilience::retries::RetryConfig;

/// Upper bound (exclusive) of the jitter multiplier.
pub const MAX_JITTER_FACTOR: f64 = 1.25;

/// Delay to wait after the zero-based `attempt` failed.
///
/// `min(initial_delay * backoff_multiplier^attempt, max_delay)`, scaled by a
/// factor in `[1.0, 1.25)` when jitter is enabled.
pub fn calculate_delay<E>(attempt: u32, config: &RetryConfig<E>) -> Duration {
    calculate_delay_with_rng(attempt, config, &mut rand::thread_rng())
}

/// Same as [`calculate_delay`] with an explicit random source, so a seeded
/// rng gives a reproducible schedule.
pub fn calculate_delay_with_rng<E, R>(
    attempt: u32,
    config: &RetryConfig<E>,
    rng: &mut R,
) -> Duration
where
    R: Rng + ?Sized,
{
    let capped = capped_delay(
        attempt,
        config.initial_delay,
        config.max_delay,
        config.backoff_multiplier,
    );
    if !config.jitter {
        return capped;
    }

    let factor: f64 = rng.gen_range(1.0..MAX_JITTER_FACTOR);
    let jittered = (capped.as_nanos() as f64 * factor) as u64;
    Duration::from_nanos(jittered).max(capped)
}

/// Exponential part without jitter. Works in nanoseconds so that the common
/// millisecond configurations come out exact.
fn capped_delay(attempt: u32, initial: Duration, max: Duration, multiplier: f64) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let base = initial.as_nanos() as f64 * multiplier.powi(exponent);

    // NaN or infinity from a huge exponent lands on the cap as well.
    if !base.is_finite() || base >= max.as_nanos() as f64 {
        return max;
    }
    Duration::from_nanos(base.max(0.0) as u64)
}
