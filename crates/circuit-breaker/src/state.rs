//! Circuit state enum.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    #[default]
    Closed,
    /// Dependency assumed down, calls fail fast
    Open,
    /// Cooldown elapsed, a limited number of probe calls are admitted
    HalfOpen,
}

impl CircuitState {
    /// Wire/log spelling of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
