//! Named breaker registry.
//!
//! One registry per process. Breakers are created lazily on first use and
//! shared via `Arc`; each keeps its own lock, so the map itself is only
//! touched on lookup.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::schema::ResilienceSettings;
use crate::resilience::circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig};

pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            overrides: HashMap::new(),
        }
    }

    /// Default breaker config from `[circuit_breaker]`, per-name configs
    /// from `[breakers.<name>]`.
    pub fn from_settings(settings: &ResilienceSettings) -> Self {
        let overrides = settings
            .breakers
            .iter()
            .map(|(name, over)| {
                let merged = over.apply(&settings.circuit_breaker);
                (name.clone(), CircuitBreakerConfig::from_settings(&merged))
            })
            .collect();

        Self {
            breakers: DashMap::new(),
            default_config: CircuitBreakerConfig::from_settings(&settings.circuit_breaker),
            overrides,
        }
    }

    /// Use `config` for the breaker called `name` instead of the default.
    /// Only affects breakers created afterwards.
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    pub fn config_for(&self, name: &str) -> CircuitBreakerConfig {
        self.overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(name, self.config_for(name)))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Discard a breaker. Holders of the `Arc` keep a working, detached copy.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Stats of every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|entry| entry.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
