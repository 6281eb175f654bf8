//! Error types surfaced by the resilience primitives.
//!
//! # Taxonomy
//! ```text
//! ResilienceError<E>
//!     Operation(E)   the wrapped call failed on its own, passed through unchanged
//!     Timeout        a per-attempt or per-call timer fired first
//!     CircuitOpen    the breaker rejected the call without attempting it
//! ```
//!
//! Callers match on the variant to tell "exhausted retries" apart from
//! "circuit open" (fallback vs. alert), with no downcasting involved.

use std::time::Duration;
use thiserror::Error;

/// Failure produced by [`with_retry`](crate::resilience::retries::with_retry)
/// or [`CircuitBreaker::execute`](crate::resilience::circuit_breaker::CircuitBreaker::execute).
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The operation's own error.
    #[error(transparent)]
    Operation(E),

    /// The operation did not complete before its deadline.
    #[error("operation timed out after {after:?}")]
    Timeout {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The breaker is open and the call was never attempted.
    #[error("circuit breaker '{name}' is open (retry in {retry_after:?})")]
    CircuitOpen {
        /// Name of the rejecting breaker.
        name: String,
        /// Remaining cooldown before a trial call will be admitted.
        retry_after: Duration,
    },
}

impl<E> ResilienceError<E> {
    /// True for a synthesized timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// True for a fast-fail rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Borrow the operation's error, if that is what this is.
    pub fn operation(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the operation's error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Map the operation error, keeping synthesized variants intact.
    pub fn map_operation<F, U>(self, f: F) -> ResilienceError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            ResilienceError::Operation(e) => ResilienceError::Operation(f(e)),
            ResilienceError::Timeout { after } => ResilienceError::Timeout { after },
            ResilienceError::CircuitOpen { name, retry_after } => {
                ResilienceError::CircuitOpen { name, retry_after }
            }
        }
    }
}

impl<E> ResilienceError<ResilienceError<E>> {
    /// Collapse the double wrapping produced by nesting a retry inside a
    /// breaker (or the other way around).
    pub fn flatten(self) -> ResilienceError<E> {
        match self {
            ResilienceError::Operation(inner) => inner,
            ResilienceError::Timeout { after } => ResilienceError::Timeout { after },
            ResilienceError::CircuitOpen { name, retry_after } => {
                ResilienceError::CircuitOpen { name, retry_after }
            }
        }
    }
}

/// Structured transport failure for collaborators that wrap network or
/// database clients. Mapping a client error into this type gets the default
/// retry classification for free.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("connection timed out")]
    TimedOut,

    #[error("failed to resolve host '{host}'")]
    Dns { host: String },

    #[error("peer closed the connection")]
    PeerClosed,

    /// The remote answered with a status code.
    #[error("upstream returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// Anything else, e.g. a request that failed validation before leaving.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Shorthand for a status failure.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            code,
            message: message.into(),
        }
    }
}
