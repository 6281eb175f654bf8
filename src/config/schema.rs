//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience layer. All types derive Serde traits for deserialization from
//! config files; durations are plain millisecond integers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Retry timings shared by every `with_retry` call built from settings.
    pub retry: RetrySettings,

    /// Default breaker settings.
    pub circuit_breaker: BreakerSettings,

    /// Per-dependency breaker overrides, keyed by breaker name.
    pub breakers: BTreeMap<String, BreakerOverride>,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay after the first failure in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for the exponential delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Randomize delays by up to +25%.
    pub jitter: bool,

    /// Deadline for a single attempt in milliseconds.
    pub per_attempt_timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
            per_attempt_timeout_ms: 30_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,

    /// Time open before a trial call in milliseconds.
    pub reset_timeout_ms: u64,

    /// Half-open successes needed to close.
    pub success_threshold: u32,

    /// Deadline for a guarded call in milliseconds.
    pub per_call_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            success_threshold: 3,
            per_call_timeout_ms: 30_000,
        }
    }
}

/// Partial breaker settings; unset fields fall back to `[circuit_breaker]`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub success_threshold: Option<u32>,
    pub per_call_timeout_ms: Option<u64>,
}

impl BreakerOverride {
    pub fn apply(&self, base: &BreakerSettings) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            reset_timeout_ms: self.reset_timeout_ms.unwrap_or(base.reset_timeout_ms),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            per_call_timeout_ms: self.per_call_timeout_ms.unwrap_or(base.per_call_timeout_ms),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// One JSON object per event, for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
