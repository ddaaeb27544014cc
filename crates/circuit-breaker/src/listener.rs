//! State-change notification.

use crate::state::CircuitState;

/// Receives breaker transitions.
///
/// Called synchronously after the breaker has applied the transition and
/// released its lock. Implementations should only log or record metrics.
pub trait StateChangeListener: Send + Sync {
    fn on_state_change(&self, from: CircuitState, to: CircuitState, name: &str);
}

impl<F> StateChangeListener for F
where
    F: Fn(CircuitState, CircuitState, &str) + Send + Sync,
{
    fn on_state_change(&self, from: CircuitState, to: CircuitState, name: &str) {
        self(from, to, name);
    }
}
