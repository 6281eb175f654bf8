//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, thresholds > 0, multiplier >= 1)
//! - Check per-breaker overrides after merging with the defaults
//! - Validate logging settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceSettings → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BreakerSettings, ResilienceSettings};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("retry.max_delay_ms ({max}) is smaller than retry.initial_delay_ms ({initial})")]
    DelayOrder { initial: u64, max: u64 },

    #[error("retry.backoff_multiplier must be a finite number >= 1.0, got {0}")]
    Multiplier(f64),

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

fn zero(field: impl Into<String>) -> ValidationError {
    ValidationError::Zero { field: field.into() }
}

pub fn validate_config(config: &ResilienceSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let retry = &config.retry;
    if retry.initial_delay_ms == 0 {
        errors.push(zero("retry.initial_delay_ms"));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::DelayOrder {
            initial: retry.initial_delay_ms,
            max: retry.max_delay_ms,
        });
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::Multiplier(retry.backoff_multiplier));
    }
    if retry.per_attempt_timeout_ms == 0 {
        errors.push(zero("retry.per_attempt_timeout_ms"));
    }

    check_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);
    for (name, over) in &config.breakers {
        let merged = over.apply(&config.circuit_breaker);
        check_breaker(&format!("breakers.{name}"), &merged, &mut errors);
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(obs.log_level.clone()));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(obs.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_breaker(section: &str, settings: &BreakerSettings, errors: &mut Vec<ValidationError>) {
    if settings.failure_threshold == 0 {
        errors.push(zero(format!("{section}.failure_threshold")));
    }
    if settings.success_threshold == 0 {
        errors.push(zero(format!("{section}.success_threshold")));
    }
    if settings.reset_timeout_ms == 0 {
        errors.push(zero(format!("{section}.reset_timeout_ms")));
    }
    if settings.per_call_timeout_ms == 0 {
        errors.push(zero(format!("{section}.per_call_timeout_ms")));
    }
}
