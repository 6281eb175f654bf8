//! Configuration loading from disk and environment.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then
//! `RESILIENCE_*` environment variables. Validation runs last on the merged
//! result.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::ResilienceSettings;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => write!(f, "Invalid value for {}: '{}'", var, value),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Load, apply environment overrides, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<ResilienceSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = parse_config(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Defaults plus environment overrides, for running without a file.
pub fn load_from_env() -> Result<ResilienceSettings, ConfigError> {
    let mut config = ResilienceSettings::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse TOML without validating.
pub fn parse_config(content: &str) -> Result<ResilienceSettings, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Overwrite fields from `RESILIENCE_*` variables. `lookup` is
/// `std::env::var` outside of tests.
pub fn apply_env_overrides<L>(config: &mut ResilienceSettings, lookup: L) -> Result<(), ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    if let Some(v) = env_parse(&lookup, "RESILIENCE_MAX_RETRIES")? {
        config.retry.max_retries = v;
    }
    if let Some(v) = env_parse(&lookup, "RESILIENCE_INITIAL_DELAY_MS")? {
        config.retry.initial_delay_ms = v;
    }
    if let Some(v) = env_parse(&lookup, "RESILIENCE_MAX_DELAY_MS")? {
        config.retry.max_delay_ms = v;
    }
    if let Some(v) = env_parse(&lookup, "RESILIENCE_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = v;
    }
    if let Some(v) = env_parse(&lookup, "RESILIENCE_RESET_TIMEOUT_MS")? {
        config.circuit_breaker.reset_timeout_ms = v;
    }
    if let Some(level) = lookup("RESILIENCE_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    Ok(())
}

fn env_parse<L, T>(lookup: &L, var: &'static str) -> Result<Option<T>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
    }
}
