//! Breaker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a single circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Minimum time the circuit stays OPEN before a probe is admitted
    #[serde(default = "default_cooldown_period_ms")]
    pub cooldown_period_ms: u64,

    /// Probe calls admitted per HALF_OPEN period
    #[serde(default = "default_half_open_max_attempts")]
    pub half_open_max_attempts: u32,
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_period_ms() -> u64 {
    30_000
}

const fn default_half_open_max_attempts() -> u32 {
    1
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_period_ms: default_cooldown_period_ms(),
            half_open_max_attempts: default_half_open_max_attempts(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Cooldown as a `Duration`.
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_period_ms)
    }

    /// Clamp zero thresholds to 1 so a breaker can always open and always
    /// admit a probe.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            failure_threshold: self.failure_threshold.max(1),
            half_open_max_attempts: self.half_open_max_attempts.max(1),
            ..self
        }
    }

    /// Apply an override on top of this config, then normalize.
    #[must_use]
    pub fn merged(self, over: &CircuitBreakerConfigOverride) -> Self {
        Self {
            failure_threshold: over.failure_threshold.unwrap_or(self.failure_threshold),
            cooldown_period_ms: over.cooldown_period_ms.unwrap_or(self.cooldown_period_ms),
            half_open_max_attempts: over
                .half_open_max_attempts
                .unwrap_or(self.half_open_max_attempts),
        }
        .normalized()
    }
}

/// Per-breaker override applied over the factory defaults at creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfigOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub half_open_max_attempts: Option<u32>,
}
