//! # Circuit Breaker
//!
//! Guards calls to unreliable upstream dependencies (LLM APIs, cluster API
//! calls) so that a dependency known to be failing is rejected fast instead of
//! being hammered.
//!
//! ## State Transitions
//!
//! ```text
//! CLOSED    → OPEN:      consecutive failures >= failure_threshold
//! OPEN      → HALF_OPEN: cooldown period elapsed
//! HALF_OPEN → CLOSED:    probe succeeded
//! HALF_OPEN → OPEN:      probe failed
//! any       → CLOSED:    reset()
//! ```
//!
//! This crate provides:
//! - [`CircuitBreaker`]: the per-dependency state machine
//! - [`CircuitBreakerFactory`]: a named registry of independent breakers
//! - [`StateChangeListener`]: synchronous transition notifications
//!
//! ## Example
//!
//! ```rust,ignore
//! use circuit_breaker::{BreakerError, CircuitBreakerFactory};
//!
//! let factory = CircuitBreakerFactory::default();
//! let breaker = factory.get_or_create("ai-backend", None);
//!
//! match breaker.execute(|| async { call_llm().await }).await {
//!     Ok(reply) => println!("{reply}"),
//!     Err(BreakerError::Open(open)) => eprintln!("retry in {}ms", open.remaining_cooldown_ms),
//!     Err(BreakerError::Inner(e)) => eprintln!("upstream failed: {e}"),
//! }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod factory;
pub mod listener;
pub mod state;

pub use breaker::{CircuitBreaker, CircuitBreakerStats};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigOverride};
pub use error::{BreakerError, CircuitOpenError};
pub use factory::CircuitBreakerFactory;
pub use listener::StateChangeListener;
pub use state::CircuitState;
