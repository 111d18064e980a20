//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a single trial call decides recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= fail_max
//! Open → Half-Open: after `timeout` has elapsed since opening
//! Half-Open → Closed: probe call succeeds (failure count reset)
//! Half-Open → Open: probe call fails (timer restarted)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, owned by whoever builds the Ambassadors and injected
//! - All transitions happen under one mutex; the lock is never held across an await
//! - Single probe in Half-Open, tracked by an RAII permit so a cancelled probe frees the slot

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::translation::now_millis;

/// Thresholds for a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub fail_max: u32,
    /// Time spent open before a trial call is admitted.
    pub timeout: Duration,
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            fail_max: config.fail_max.max(1),
            timeout: config.open_duration(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

/// Circuit breaker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn code(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned instead of calling the operation while the circuit is open.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit for {dependency} is open, retry in {retry_after:?}")]
pub struct CircuitOpenError {
    pub dependency: String,
    pub retry_after: Duration,
}

/// Error from a breaker-guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub dependency: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Wall-clock time of the most recent failure, in epoch milliseconds.
    pub last_failure_at_ms: Option<u64>,
    pub fail_max: u32,
    pub open_duration: Duration,
}

#[derive(Debug)]
struct Inner {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at_ms: Option<u64>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

type Transition = (CircuitState, CircuitState);

impl Inner {
    fn transition(&mut self, to: CircuitState) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        match to {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.opened_at = None;
            }
            CircuitState::Open => self.opened_at = Some(Instant::now()),
            CircuitState::HalfOpen => {}
        }
        Some((from, to))
    }

    fn remaining_open(&self) -> Duration {
        match self.opened_at {
            Some(opened) => self.config.timeout.saturating_sub(opened.elapsed()),
            None => Duration::ZERO,
        }
    }
}

/// Circuit breaker guarding a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: String,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(dependency: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let dependency = dependency.into();
        metrics::record_breaker_state(&dependency, CircuitState::Closed.code());
        Self {
            dependency,
            inner: Mutex::new(Inner {
                config,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at_ms: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        &self.dependency
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    /// Stored mode. An open circuit whose timeout has elapsed reports `Open`
    /// until the next call is admitted as the probe.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            dependency: self.dependency.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at_ms: inner.last_failure_at_ms,
            fail_max: inner.config.fail_max,
            open_duration: inner.config.timeout,
        }
    }

    /// The error a caller would get right now if the circuit is open.
    pub fn open_error(&self) -> CircuitOpenError {
        let remaining = self.lock().remaining_open();
        CircuitOpenError {
            dependency: self.dependency.clone(),
            retry_after: remaining,
        }
    }

    /// Apply new thresholds without touching the current mode.
    pub fn reconfigure(&self, config: CircuitBreakerConfig) {
        let mut inner = self.lock();
        if inner.config != config {
            tracing::info!(
                dependency = %self.dependency,
                fail_max = config.fail_max,
                timeout_ms = config.timeout.as_millis() as u64,
                "Circuit breaker reconfigured"
            );
            inner.config = config;
        }
    }

    /// Force the circuit closed and forget the failure history.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.lock();
            inner.last_failure_at_ms = None;
            inner.probe_in_flight = false;
            let t = inner.transition(CircuitState::Closed);
            inner.consecutive_failures = 0;
            t
        };
        self.publish(transition);
        tracing::info!(dependency = %self.dependency, "Circuit breaker manually reset");
    }

    /// Run `operation` under the breaker; every error counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(operation, |_| true).await
    }

    /// Run `operation` under the breaker; errors for which `counts_as_failure`
    /// returns false are passed through without touching the failure count.
    pub async fn execute_classified<F, Fut, T, E, C>(
        &self,
        operation: F,
        counts_as_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let permit = self.acquire()?;

        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                if counts_as_failure(&error) {
                    permit.fail();
                } else {
                    permit.release();
                }
                Err(BreakerError::Inner(error))
            }
        }
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let (probe, transition) = {
            let mut inner = self.lock();
            let state = inner.state;
            match state {
                CircuitState::Closed => (false, None),
                CircuitState::Open => {
                    let remaining = inner.remaining_open();
                    if !remaining.is_zero() {
                        drop(inner);
                        return Err(self.reject(remaining));
                    }
                    inner.probe_in_flight = true;
                    (true, inner.transition(CircuitState::HalfOpen))
                }
                CircuitState::HalfOpen => {
                    if inner.probe_in_flight {
                        drop(inner);
                        return Err(self.reject(Duration::ZERO));
                    }
                    inner.probe_in_flight = true;
                    (true, None)
                }
            }
        };

        self.publish(transition);
        if probe {
            tracing::info!(dependency = %self.dependency, "Circuit half-open, admitting trial call");
        }

        Ok(Permit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn reject(&self, retry_after: Duration) -> CircuitOpenError {
        tracing::debug!(
            dependency = %self.dependency,
            retry_after_ms = retry_after.as_millis() as u64,
            "Circuit open, failing fast"
        );
        metrics::record_breaker_rejection(&self.dependency);
        CircuitOpenError {
            dependency: self.dependency.clone(),
            retry_after,
        }
    }

    fn on_success(&self, probe: bool) {
        let transition = {
            let mut inner = self.lock();
            if probe {
                inner.probe_in_flight = false;
                inner.transition(CircuitState::Closed)
            } else {
                if inner.state == CircuitState::Closed {
                    inner.consecutive_failures = 0;
                }
                // A late success from before the circuit opened proves nothing.
                None
            }
        };
        self.publish(transition);
    }

    fn on_failure(&self, probe: bool) {
        let (failures, fail_max, transition) = {
            let mut inner = self.lock();
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            inner.last_failure_at_ms = Some(now_millis());

            let transition = if probe {
                inner.probe_in_flight = false;
                // Re-opening from half-open restarts the timer.
                inner.transition(CircuitState::Open)
            } else if inner.state == CircuitState::Closed
                && inner.consecutive_failures >= inner.config.fail_max
            {
                inner.transition(CircuitState::Open)
            } else {
                None
            };
            (inner.consecutive_failures, inner.config.fail_max, transition)
        };

        tracing::warn!(
            dependency = %self.dependency,
            consecutive_failures = failures,
            fail_max,
            "Failure recorded"
        );
        self.publish(transition);
    }

    fn on_release(&self, probe: bool) {
        if probe {
            self.lock().probe_in_flight = false;
        }
    }

    fn publish(&self, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            if to == CircuitState::Open {
                tracing::error!(
                    dependency = %self.dependency,
                    from = from.as_str(),
                    to = to.as_str(),
                    "Circuit breaker opened"
                );
            } else {
                tracing::info!(
                    dependency = %self.dependency,
                    from = from.as_str(),
                    to = to.as_str(),
                    "Circuit breaker state transition"
                );
            }
            metrics::record_breaker_transition(&self.dependency, from.as_str(), to.as_str());
            metrics::record_breaker_state(&self.dependency, to.code());
        }
    }
}

/// Admission ticket for one call. Dropping it unsettled frees a probe slot.
#[must_use]
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }

    fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.probe);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_release(self.probe);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(fail_max: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                fail_max,
                timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    async fn fail_once(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<&'static str>> {
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("boom")
        })
        .await
    }

    async fn succeed_once(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<u32, BreakerError<&'static str>> {
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &'static str>(7)
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_fail_max_and_fails_fast() {
        let cb = breaker(3, 60);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(matches!(fail_once(&cb, &calls).await, Err(BreakerError::Inner("boom"))));
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let err = succeed_once(&cb, &calls).await.unwrap_err();
        assert!(matches!(err, BreakerError::Open(ref e) if e.dependency == "test"));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "operation must not run while open");

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(succeed_once(&cb, &calls).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_and_resets() {
        let cb = breaker(2, 10);
        let calls = AtomicU32::new(0);
        let _ = fail_once(&cb, &calls).await;
        let _ = fail_once(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(succeed_once(&cb, &calls).await.unwrap(), 7);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_failure_at_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_timer() {
        let cb = breaker(1, 10);
        let calls = AtomicU32::new(0);
        let _ = fail_once(&cb, &calls).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(matches!(fail_once(&cb, &calls).await, Err(BreakerError::Inner(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(succeed_once(&cb, &calls).await, Err(BreakerError::Open(_))));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(succeed_once(&cb, &calls).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let cb = breaker(1, 1);
        let calls = AtomicU32::new(0);
        let _ = fail_once(&cb, &calls).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        let probe = cb.acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.acquire().is_err(), "second concurrent probe must be rejected");

        // A cancelled probe frees the slot without deciding the outcome.
        drop(probe);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let probe = cb.acquire().unwrap();
        probe.succeed();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_count() {
        let cb = breaker(3, 60);
        let calls = AtomicU32::new(0);
        let _ = fail_once(&cb, &calls).await;
        let _ = fail_once(&cb, &calls).await;
        let _ = succeed_once(&cb, &calls).await;
        let _ = fail_once(&cb, &calls).await;
        let _ = fail_once(&cb, &calls).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_unclassified_errors_do_not_trip() {
        let cb = breaker(1, 60);
        for _ in 0..5 {
            let result = cb
                .execute_classified(|| async { Err::<(), _>("bad input") }, |_| false)
                .await;
            assert!(matches!(result, Err(BreakerError::Inner("bad input"))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_reset_and_reconfigure() {
        let cb = breaker(1, 60);
        let calls = AtomicU32::new(0);
        let _ = fail_once(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);

        cb.reconfigure(CircuitBreakerConfig {
            fail_max: 2,
            timeout: Duration::from_secs(5),
        });
        let _ = fail_once(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().fail_max, 2);
    }
}
