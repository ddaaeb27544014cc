//! Circuit Breaker Factory - Manages named breaker instances.
//!
//! One factory is created per process (or per subsystem) and threaded through
//! callers; there is no global instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::config::{CircuitBreakerConfig, CircuitBreakerConfigOverride};
use crate::listener::StateChangeListener;

/// Registry of independent circuit breakers keyed by dependency name.
pub struct CircuitBreakerFactory {
    default_config: CircuitBreakerConfig,
    listener: Option<Arc<dyn StateChangeListener>>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerFactory {
    /// Create an empty registry.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            listener: None,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a listener to every breaker created from now on.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn StateChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Return the breaker registered under `name`, creating it on first use.
    ///
    /// Config is fixed at first creation; an override passed on a later call
    /// for the same name is ignored.
    pub fn get_or_create(
        &self,
        name: &str,
        config_override: Option<CircuitBreakerConfigOverride>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have inserted while we waited for the write lock.
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            let config = config_override
                .as_ref()
                .map_or(self.default_config, |over| self.default_config.merged(over));
            debug!(circuit = %name, ?config, "Creating circuit breaker");

            let mut breaker = CircuitBreaker::new(name, config);
            if let Some(listener) = &self.listener {
                breaker = breaker.with_listener(Arc::clone(listener));
            }
            Arc::new(breaker)
        }))
    }

    /// Look up a breaker without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers.get(name).cloned()
    }

    /// Reset every registered breaker to CLOSED.
    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
    }

    /// Stats for every registered breaker, keyed by name.
    pub fn all_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.stats()))
            .collect()
    }

    /// Registered breaker names.
    pub fn names(&self) -> Vec<String> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = breakers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Clone the breaker handles so callbacks never run under the registry lock.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers.values().cloned().collect()
    }
}

impl Default for CircuitBreakerFactory {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
