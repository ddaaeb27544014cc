//! Error types for circuit breakers.

use thiserror::Error;

use crate::state::CircuitState;

/// Raised instead of invoking the guarded operation when the breaker denies a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit '{circuit_name}' is {state}, retry in {remaining_cooldown_ms}ms")]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call
    pub circuit_name: String,
    /// Time left until a probe may be admitted (0 while a probe is in flight)
    pub remaining_cooldown_ms: u64,
    /// Blocking state at rejection time, always `Open`
    pub state: CircuitState,
}

/// Error returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker denied the call; the operation never ran
    #[error(transparent)]
    Open(CircuitOpenError),

    /// The operation ran and failed; the original error is untouched
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether the breaker itself denied the call.
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The denial details, if this is a breaker rejection.
    pub const fn as_open(&self) -> Option<&CircuitOpenError> {
        match self {
            Self::Open(open) => Some(open),
            Self::Inner(_) => None,
        }
    }

    /// The upstream error, if the operation ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_message_names_circuit_and_cooldown() {
        let err = CircuitOpenError {
            circuit_name: "ai-backend".to_string(),
            remaining_cooldown_ms: 1500,
            state: CircuitState::Open,
        };
        assert_eq!(
            err.to_string(),
            "Circuit 'ai-backend' is OPEN, retry in 1500ms"
        );
    }

    #[test]
    fn test_inner_error_is_transparent() {
        let err: BreakerError<std::io::Error> =
            BreakerError::Inner(std::io::Error::other("connection reset"));
        assert_eq!(err.to_string(), "connection reset");
        assert!(!err.is_open());
        assert!(err.into_inner().is_some());
    }
}
