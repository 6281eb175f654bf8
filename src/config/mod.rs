//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (RESILIENCE_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → ResilienceSettings (validated, immutable)
//!     → RetryConfig / CircuitBreakerConfig / BreakerRegistry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    BreakerOverride, BreakerSettings, LogFormat, ObservabilityConfig, ResilienceSettings,
    RetrySettings,
};
pub use validation::{validate_config, ValidationError};
