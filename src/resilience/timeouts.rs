//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race a fallible future against a deadline
//! - Turn an elapsed deadline into `ResilienceError::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from the operation's own errors
//! - The losing future is dropped, so a late result is never observed

use std::future::Future;
use std::time::Duration;

use crate::resilience::error::ResilienceError;

/// Run `operation` with a deadline.
pub async fn run_with_timeout<F, T, E>(
    deadline: Duration,
    operation: F,
) -> Result<T, ResilienceError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ResilienceError::Operation(e)),
        Err(_elapsed) => Err(ResilienceError::Timeout { after: deadline }),
    }
}
