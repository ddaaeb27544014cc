//! Per-dependency circuit breaker state machine.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{BreakerError, CircuitOpenError};
use crate::listener::StateChangeListener;
use crate::state::CircuitState;

type Transition = (CircuitState, CircuitState);

/// Snapshot of a breaker's counters and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub half_open_attempts: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    /// Present only while OPEN
    pub remaining_cooldown_ms: Option<u64>,
    pub config: CircuitBreakerConfig,
}

/// Mutable breaker state. Every mutation happens under one lock.
#[derive(Debug, Default)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    total_failures: u64,
    total_successes: u64,
    half_open_attempts: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    open_log_emitted: bool,
}

impl Inner {
    fn elapsed_open(&self, now: Instant) -> Duration {
        self.opened_at
            .map_or(Duration::ZERO, |at| now.saturating_duration_since(at))
    }

    fn cooldown_elapsed(&self, cooldown: Duration, now: Instant) -> bool {
        self.state == CircuitState::Open && self.elapsed_open(now) >= cooldown
    }

    fn remaining_cooldown_ms(&self, cooldown: Duration, now: Instant) -> u64 {
        cooldown
            .saturating_sub(self.elapsed_open(now))
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.opened_at_wall = Some(Utc::now());
        self.open_log_emitted = false;
        self.half_open_attempts = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.half_open_attempts = 0;
        self.opened_at = None;
        self.opened_at_wall = None;
        self.open_log_emitted = false;
    }

    /// OPEN → HALF_OPEN once the cooldown has elapsed.
    fn refresh(&mut self, cooldown: Duration, now: Instant) -> Option<Transition> {
        if !self.cooldown_elapsed(cooldown, now) {
            return None;
        }
        self.state = CircuitState::HalfOpen;
        self.half_open_attempts = 0;
        self.open_log_emitted = false;
        Some((CircuitState::Open, CircuitState::HalfOpen))
    }

    fn on_success(&mut self) -> Option<Transition> {
        self.total_successes += 1;
        self.last_success_time = Some(Utc::now());
        self.consecutive_failures = 0;

        match self.state {
            CircuitState::HalfOpen => {
                self.close();
                Some((CircuitState::HalfOpen, CircuitState::Closed))
            }
            CircuitState::Closed | CircuitState::Open => None,
        }
    }

    fn on_failure(&mut self, threshold: u32, now: Instant) -> Option<Transition> {
        self.total_failures += 1;
        self.last_failure_time = Some(Utc::now());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed if self.consecutive_failures >= threshold => {
                self.trip(now);
                Some((CircuitState::Closed, CircuitState::Open))
            }
            CircuitState::HalfOpen => {
                self.trip(now);
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }
            CircuitState::Closed | CircuitState::Open => None,
        }
    }
}

/// A named circuit breaker guarding one upstream dependency.
///
/// Safe to share across tasks (`Arc<CircuitBreaker>`); admission and
/// bookkeeping are serialized by an internal lock that is never held across
/// the guarded operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    listener: Option<Arc<dyn StateChangeListener>>,
}

impl CircuitBreaker {
    /// Create a CLOSED breaker with zeroed counters. Zero thresholds in
    /// `config` are raised to 1.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: config.normalized(),
            inner: Mutex::new(Inner::default()),
            listener: None,
        }
    }

    /// Attach a state-change listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn StateChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// Denied calls return [`BreakerError::Open`] without running
    /// `operation`. Upstream failures are recorded and returned unchanged as
    /// [`BreakerError::Inner`]. No timeout is applied to `operation`.
    ///
    /// The outcome is recorded against the state current at completion, so a
    /// call admitted while CLOSED that finishes after the circuit has tripped
    /// and cooled down counts as the HALF_OPEN probe result.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probe = self.admit().map_err(BreakerError::Open)?;
        let mut slot = ProbeSlot {
            breaker: self,
            armed: probe,
        };

        let result = operation().await;
        slot.armed = false;

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Record a success without wrapping a call.
    pub fn record_success(&self) {
        let transitions = {
            let mut inner = self.lock();
            let now = Instant::now();
            let mut transitions = Vec::with_capacity(2);
            transitions.extend(inner.refresh(self.config.cooldown(), now));
            transitions.extend(inner.on_success());
            transitions
        };
        self.notify(&transitions);
    }

    /// Record a failure without wrapping a call.
    pub fn record_failure(&self) {
        let transitions = {
            let mut inner = self.lock();
            let now = Instant::now();
            let mut transitions = Vec::with_capacity(2);
            transitions.extend(inner.refresh(self.config.cooldown(), now));
            transitions.extend(inner.on_failure(self.config.failure_threshold, now));
            if let Some((_, CircuitState::Open)) = transitions.last() {
                debug!(
                    circuit = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    cooldown_ms = self.config.cooldown_period_ms,
                    "Failure tripped circuit"
                );
            }
            transitions
        };
        self.notify(&transitions);
    }

    /// Return to CLOSED unconditionally.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.close();
            previous
        };
        if previous != CircuitState::Closed {
            self.notify(&[(previous, CircuitState::Closed)]);
        }
    }

    /// Current state. Reports HALF_OPEN once an OPEN circuit's cooldown has
    /// elapsed, even before the next call applies the transition.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        Self::effective_state(&inner, self.config.cooldown(), Instant::now())
    }

    /// True only for OPEN; HALF_OPEN also restricts admission but is not open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        let now = Instant::now();
        let cooldown = self.config.cooldown();
        let state = Self::effective_state(&inner, cooldown, now);
        let pending_probe = state != inner.state;

        CircuitBreakerStats {
            name: self.name.clone(),
            state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            half_open_attempts: if pending_probe {
                0
            } else {
                inner.half_open_attempts
            },
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            opened_at: inner.opened_at_wall,
            remaining_cooldown_ms: (state == CircuitState::Open)
                .then(|| inner.remaining_cooldown_ms(cooldown, now)),
            config: self.config,
        }
    }

    /// Decide whether a call may run. `Ok(true)` marks a half-open probe.
    fn admit(&self) -> Result<bool, CircuitOpenError> {
        let mut transitions = Vec::new();
        let decision = {
            let mut inner = self.lock();
            let now = Instant::now();
            let cooldown = self.config.cooldown();
            transitions.extend(inner.refresh(cooldown, now));

            match inner.state {
                CircuitState::Closed => Ok(false),
                CircuitState::Open => {
                    let remaining_cooldown_ms = inner.remaining_cooldown_ms(cooldown, now);
                    if inner.open_log_emitted {
                        debug!(
                            circuit = %self.name,
                            remaining_cooldown_ms,
                            "Rejected call, open notice already logged"
                        );
                    } else {
                        inner.open_log_emitted = true;
                        warn!(
                            circuit = %self.name,
                            remaining_cooldown_ms,
                            consecutive_failures = inner.consecutive_failures,
                            "circuit open, rejecting calls until cooldown elapses"
                        );
                    }
                    Err(self.open_error(remaining_cooldown_ms))
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_attempts >= self.config.half_open_max_attempts {
                        debug!(
                            circuit = %self.name,
                            in_flight = inner.half_open_attempts,
                            "Rejected call, half-open probe already in flight"
                        );
                        Err(self.open_error(0))
                    } else {
                        inner.half_open_attempts += 1;
                        Ok(true)
                    }
                }
            }
        };
        self.notify(&transitions);
        decision
    }

    /// Give back a half-open slot whose probe was dropped before finishing.
    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.half_open_attempts > 0 {
            inner.half_open_attempts -= 1;
        }
    }

    fn open_error(&self, remaining_cooldown_ms: u64) -> CircuitOpenError {
        CircuitOpenError {
            circuit_name: self.name.clone(),
            remaining_cooldown_ms,
            state: CircuitState::Open,
        }
    }

    fn effective_state(inner: &Inner, cooldown: Duration, now: Instant) -> CircuitState {
        if inner.cooldown_elapsed(cooldown, now) {
            CircuitState::HalfOpen
        } else {
            inner.state
        }
    }

    fn notify(&self, transitions: &[Transition]) {
        for &(from, to) in transitions {
            info!(circuit = %self.name, %from, %to, "Circuit breaker state transition");
            if let Some(listener) = &self.listener {
                listener.on_state_change(from, to, &self.name);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Releases a half-open slot if the probe future is dropped mid-flight.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_period_ms: cooldown_ms,
                half_open_max_attempts: 1,
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> BreakerError<io::Error> {
        breaker
            .execute(|| async { Err::<(), _>(io::Error::other("boom")) })
            .await
            .unwrap_err()
    }

    async fn succeed(breaker: &CircuitBreaker) {
        breaker
            .execute(|| async { Ok::<_, io::Error>(()) })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_exactly_at_threshold() {
        let breaker = breaker(3, 1_000);

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = breaker(3, 1_000);

        fail(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;

        let stats = breaker.stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.total_failures, 2);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_propagates_unchanged() {
        let breaker = breaker(3, 1_000);

        let err = fail(&breaker).await;
        let inner = err.into_inner().expect("upstream error");
        assert_eq!(inner.to_string(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking_operation() {
        let breaker = breaker(1, 5_000);
        fail(&breaker).await;

        let calls = AtomicUsize::new(0);
        for _ in 0..5 {
            let err = breaker
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, io::Error>(())
                })
                .await
                .unwrap_err();
            let open = err.as_open().expect("breaker rejection");
            assert_eq!(open.circuit_name, "test");
            assert_eq!(open.state, CircuitState::Open);
            assert!(open.remaining_cooldown_ms <= 5_000);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_cooldown_shrinks() {
        let breaker = breaker(1, 5_000);
        fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(2_000)).await;
        let err = fail(&breaker).await;
        assert_eq!(err.as_open().unwrap().remaining_cooldown_ms, 3_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_moves_to_half_open_then_success_closes() {
        let breaker = breaker(2, 1_000);
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.is_open());

        succeed(&breaker).await;
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.half_open_attempts, 0);
        assert!(stats.opened_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let breaker = breaker(1, 1_000);
        fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(1_500)).await;
        let err = fail(&breaker).await;
        assert!(!err.is_open(), "probe should have run");

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.remaining_cooldown_ms, Some(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_fires_single_callback_from_open() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let breaker = breaker(1, 1_000).with_listener(Arc::new(
            move |from: CircuitState, to: CircuitState, name: &str| {
                sink.lock().unwrap().push((from, to, name.to_string()));
            },
        ));

        fail(&breaker).await;
        seen.lock().unwrap().clear();

        breaker.reset();
        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![(CircuitState::Open, CircuitState::Closed, "test".to_string())]
        );
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_from_closed_fires_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let breaker = breaker(3, 1_000).with_listener(Arc::new(
            move |_: CircuitState, _: CircuitState, _: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        breaker.reset();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_sees_full_cycle() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let breaker = breaker(1, 100).with_listener(Arc::new(
            move |from: CircuitState, to: CircuitState, _: &str| {
                sink.lock().unwrap().push((from, to));
            },
        ));

        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;
        succeed(&breaker).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_recording_trips_and_recovers() {
        let breaker = breaker(2, 1_000);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().total_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_releases_slot() {
        let breaker = breaker(1, 100);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        {
            let probe = breaker.execute(|| std::future::pending::<Result<(), io::Error>>());
            // Poll once so the probe is admitted, then drop it.
            let _ = tokio::time::timeout(Duration::from_millis(10), probe).await;
        }

        assert_eq!(breaker.stats().half_open_attempts, 0);
        succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_half_open_attempts_still_recovers() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 0,
                cooldown_period_ms: 100,
                half_open_max_attempts: 0,
            },
        );
        assert_eq!(breaker.config().failure_threshold, 1);
        assert_eq!(breaker.config().half_open_max_attempts, 1);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(100)).await;
        succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_outliving_open_period_counts_as_probe() {
        let breaker = breaker(1, 100);
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let slow = breaker.execute(move || async move {
            gate.await.ok();
            Ok::<_, io::Error>(())
        });
        let driver = async {
            fail(&breaker).await;
            assert_eq!(breaker.state(), CircuitState::Open);
            tokio::time::advance(Duration::from_millis(100)).await;
            release.send(()).ok();
        };

        let (result, ()) = tokio::join!(slow, driver);
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
