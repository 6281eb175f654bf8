//! Retryable-error classification.
//!
//! # Responsibilities
//! - Map an error onto a coarse [`FailureClass`]
//! - Decide whether that class is transient (retry) or terminal
//!
//! # Default Policy
//! - Network failures (refused, reset, aborted, timed out, DNS, peer closed) retry
//! - Status codes retry when >= 500, or exactly 408 / 429
//! - Everything else is terminal
//!
//! A classifier supplied through `RetryConfig::with_classifier` replaces this
//! policy entirely.

use std::error::Error as StdError;
use std::io;

use tokio::time::error::Elapsed;

use crate::resilience::error::{ResilienceError, TransportError};

/// Coarse failure category used by the default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transport-level failure before any response arrived.
    Network,
    /// The remote answered with a status code.
    Status(u16),
    /// Programmer errors, validation errors, anything unrecognised.
    Other,
}

/// Errors that know which [`FailureClass`] they belong to.
pub trait Classify {
    fn classify(&self) -> FailureClass;
}

/// Messages that identify a network failure when no structured type is
/// available in the error chain.
const NETWORK_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "timed out",
    "socket hang up",
    "network error",
    "broken pipe",
    "failed to lookup address",
    "name resolution",
    "dns error",
];

/// Default retry policy.
pub fn is_retryable_error<C: Classify + ?Sized>(error: &C) -> bool {
    match error.classify() {
        FailureClass::Network => true,
        FailureClass::Status(code) => is_retryable_status(code),
        FailureClass::Other => false,
    }
}

/// 5xx, 408 (request timeout) and 429 (rate limited) are transient; other
/// 4xx codes mean the request itself is wrong.
pub fn is_retryable_status(code: u16) -> bool {
    code >= 500 || code == 408 || code == 429
}

fn classify_io_kind(kind: io::ErrorKind) -> FailureClass {
    use io::ErrorKind::*;
    match kind {
        ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected | TimedOut
        | BrokenPipe | UnexpectedEof => FailureClass::Network,
        _ => FailureClass::Other,
    }
}

fn mentions_network_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    NETWORK_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Walk the `source()` chain looking for a type we understand, then fall
/// back to message keywords.
fn classify_chain(error: &(dyn StdError + 'static)) -> FailureClass {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(transport) = err.downcast_ref::<TransportError>() {
            return transport.classify();
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            let class = classify_io_kind(io_err.kind());
            if class != FailureClass::Other {
                return class;
            }
            // io::Error::source() skips the wrapped payload itself.
            if let Some(inner) = io_err.get_ref() {
                let class = classify_chain(inner);
                if class != FailureClass::Other {
                    return class;
                }
            }
        }
        if err.is::<Elapsed>() {
            return FailureClass::Network;
        }
        current = err.source();
    }

    if mentions_network_failure(&error.to_string()) {
        FailureClass::Network
    } else {
        FailureClass::Other
    }
}

impl Classify for TransportError {
    fn classify(&self) -> FailureClass {
        match self {
            TransportError::ConnectionRefused
            | TransportError::ConnectionReset
            | TransportError::TimedOut
            | TransportError::Dns { .. }
            | TransportError::PeerClosed => FailureClass::Network,
            TransportError::Status { code, .. } => FailureClass::Status(*code),
            TransportError::Other(_) => FailureClass::Other,
        }
    }
}

impl Classify for io::Error {
    fn classify(&self) -> FailureClass {
        classify_chain(self)
    }
}

impl Classify for Elapsed {
    fn classify(&self) -> FailureClass {
        FailureClass::Network
    }
}

impl Classify for dyn StdError + Send + Sync + 'static {
    fn classify(&self) -> FailureClass {
        classify_chain(self)
    }
}

impl Classify for dyn StdError + 'static {
    fn classify(&self) -> FailureClass {
        classify_chain(self)
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn classify(&self) -> FailureClass {
        (**self).classify()
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn classify(&self) -> FailureClass {
        (**self).classify()
    }
}

impl<E: Classify> Classify for ResilienceError<E> {
    fn classify(&self) -> FailureClass {
        match self {
            ResilienceError::Operation(e) => e.classify(),
            ResilienceError::Timeout { .. } => FailureClass::Network,
            // Terminal unless the caller installs its own classifier.
            ResilienceError::CircuitOpen { .. } => FailureClass::Other,
        }
    }
}
