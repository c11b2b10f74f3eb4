//! Circuit breaker for protecting downstream services.
//!
//! # States
//! - Closed: requests pass; outcomes are counted over a rolling interval
//! - Open: requests are rejected until the open timeout elapses
//! - Half-Open: up to `max_requests` trial requests pass
//!
//! # Transitions
//! ```text
//! Closed    → Open:      trip predicate fires after a failure
//! Open      → Half-Open: open timeout elapsed
//! Half-Open → Closed:    `max_requests` consecutive trial successes
//! Half-Open → Open:      any trial failure
//! ```
//!
//! Every transition starts a new generation and clears the counts. Outcomes
//! reported for an older generation are ignored.

use crate::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Predicate deciding whether the breaker trips from Closed to Open.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests are allowed
    Closed,
    /// Requests are rejected
    Open,
    /// Limited trial requests are allowed to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        })
    }
}

/// Request outcomes counted in the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Requests allowed through
    pub requests: u32,
    /// Successful requests
    pub total_successes: u32,
    /// Failed requests
    pub total_failures: u32,
    /// Successes since the last failure
    pub consecutive_successes: u32,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl Counts {
    /// Returns `total_failures / requests`, or 0 when nothing was counted.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }

    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// Circuit breaker configuration.
///
/// Zero values fall back to defaults: `max_requests` 1, `timeout` 60s, and a
/// zero `interval` never clears the Closed-state counts. Without a trip
/// predicate the breaker trips after more than 5 consecutive failures.
#[derive(Clone)]
pub struct CircuitBreakerPolicy {
    /// Name used in logs and errors
    pub name: String,
    /// Trial requests allowed while half-open, and successes needed to close
    pub max_requests: u32,
    /// Period after which Closed-state counts are cleared
    pub interval: Duration,
    /// Time spent open before moving to half-open
    pub timeout: Duration,
    ready_to_trip: Option<TripPredicate>,
}

impl CircuitBreakerPolicy {
    /// Creates a policy with zero values and the default trip predicate.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: 0,
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
            ready_to_trip: None,
        }
    }

    /// Creates the recommended policy: 3 trial requests, a 10s window, 60s
    /// open timeout, tripping once at least 3 requests were seen and 60% or
    /// more of them failed.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name)
            .with_max_requests(3)
            .with_interval(Duration::from_secs(10))
            .with_timeout(Duration::from_secs(60))
            .with_ready_to_trip(|counts| counts.requests >= 3 && counts.failure_ratio() >= 0.6)
    }

    /// Sets the half-open trial budget.
    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Sets the rolling window for Closed-state counts.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the open-state timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the trip predicate.
    #[must_use]
    pub fn with_ready_to_trip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(predicate));
        self
    }

    fn should_trip(&self, counts: &Counts) -> bool {
        match &self.ready_to_trip {
            Some(predicate) => predicate(counts),
            None => counts.consecutive_failures > 5,
        }
    }

    fn trial_budget(&self) -> u32 {
        self.max_requests.max(1)
    }

    fn open_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_OPEN_TIMEOUT
        } else {
            self.timeout
        }
    }
}

impl fmt::Debug for CircuitBreakerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerPolicy")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("custom_ready_to_trip", &self.ready_to_trip.is_some())
            .finish()
    }
}

struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// A circuit breaker shared by all calls of one client.
///
/// State lives behind a mutex that is never held across an `.await`, so
/// concurrent outcomes are counted consistently.
///
/// # Examples
///
/// ```
/// use svckit::circuit_breaker::{CircuitBreaker, CircuitBreakerPolicy, CircuitState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = CircuitBreaker::new(
///     CircuitBreakerPolicy::new("inventory").with_ready_to_trip(|c| c.consecutive_failures >= 2),
/// );
///
/// for _ in 0..2 {
///     let _ = breaker
///         .execute(|| async { Err::<(), _>(svckit::Error::Timeout) })
///         .await;
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// let rejected = breaker.execute(|| async { Ok(()) }).await;
/// assert!(matches!(rejected, Err(svckit::Error::CircuitOpen { .. })));
/// # }
/// ```
pub struct CircuitBreaker {
    policy: CircuitBreakerPolicy,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(policy: CircuitBreakerPolicy) -> Self {
        let breaker = Self {
            policy,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: None,
            }),
        };
        {
            let mut inner = breaker.lock();
            breaker.new_generation(&mut inner, Instant::now());
        }
        breaker
    }

    /// Returns the breaker name.
    pub fn name(&self) -> &str {
        &self.policy.name
    }

    /// Returns the policy the breaker was built from.
    pub fn policy(&self) -> &CircuitBreakerPolicy {
        &self.policy
    }

    /// Returns the current state, applying any time-based transition first.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now())
    }

    /// Returns the counts of the current generation.
    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Asks to let one request through.
    ///
    /// The returned permit must be resolved with [`Permit::success`] or
    /// [`Permit::failure`]; dropping it unresolved records a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircuitOpen`] when the breaker is open, or half-open
    /// with its trial budget used up.
    pub fn allow(&self) -> Result<Permit<'_>> {
        let mut inner = self.lock();
        let state = self.current_state(&mut inner, Instant::now());

        let rejected = match state {
            CircuitState::Open => true,
            CircuitState::HalfOpen => inner.counts.requests >= self.policy.trial_budget(),
            CircuitState::Closed => false,
        };
        if rejected {
            return Err(Error::CircuitOpen {
                name: self.policy.name.clone(),
                state,
            });
        }

        inner.counts.on_request();
        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            resolved: false,
        })
    }

    /// Runs `operation` through the breaker. An `Err` from the operation
    /// counts as a failure, `Ok` as a success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircuitOpen`] without running the operation when the
    /// breaker rejects the call; otherwise the operation's own result.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.allow()?;
        let result = operation().await;
        if result.is_ok() {
            permit.success();
        } else {
            permit.failure();
        }
        result
    }

    fn record(&self, generation: u64, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        let state = self.current_state(&mut inner, now);
        if generation != inner.generation {
            return;
        }

        if success {
            inner.counts.on_success();
            if state == CircuitState::HalfOpen
                && inner.counts.consecutive_successes >= self.policy.trial_budget()
            {
                self.set_state(&mut inner, CircuitState::Closed, now);
            }
        } else {
            match state {
                CircuitState::Closed => {
                    inner.counts.on_failure();
                    if self.policy.should_trip(&inner.counts) {
                        self.set_state(&mut inner, CircuitState::Open, now);
                    }
                }
                CircuitState::HalfOpen => self.set_state(&mut inner, CircuitState::Open, now),
                CircuitState::Open => {}
            }
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> CircuitState {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            CircuitState::Closed if expired => self.new_generation(inner, now),
            CircuitState::Open if expired => self.set_state(inner, CircuitState::HalfOpen, now),
            _ => {}
        }
        inner.state
    }

    fn set_state(&self, inner: &mut Inner, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }
        let previous = inner.state;
        inner.state = state;
        self.new_generation(inner, now);

        tracing::info!(
            breaker = %self.policy.name,
            from = %previous,
            to = %state,
            "Circuit breaker state changed"
        );
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed if self.policy.interval.is_zero() => None,
            CircuitState::Closed => Some(now + self.policy.interval),
            CircuitState::Open => Some(now + self.policy.open_timeout()),
            CircuitState::HalfOpen => None,
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.policy.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Permission for one request to pass the breaker.
#[must_use = "a dropped permit is recorded as a failure"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    resolved: bool,
}

impl Permit<'_> {
    /// Records a successful outcome.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record(self.generation, true);
    }

    /// Records a failed outcome.
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record(self.generation, false);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.record(self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consecutive(n: u32) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy::new("test")
            .with_max_requests(2)
            .with_timeout(Duration::from_secs(5))
            .with_ready_to_trip(move |c| c.consecutive_failures >= n)
    }

    fn fail(cb: &CircuitBreaker) {
        cb.allow().unwrap().failure();
    }

    fn succeed(cb: &CircuitBreaker) {
        cb.allow().unwrap().success();
    }

    #[tokio::test]
    async fn test_initial_state_closed() {
        let cb = CircuitBreaker::new(CircuitBreakerPolicy::new("test"));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow().is_ok());
    }

    #[tokio::test]
    async fn test_default_predicate_trips_after_six_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerPolicy::new("test"));
        for _ in 0..5 {
            fail(&cb);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_ratio_policy_trips() {
        let cb = CircuitBreaker::new(CircuitBreakerPolicy::with_defaults("orders"));
        succeed(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb);
        // 2 of 3 failed
        assert_eq!(cb.state(), CircuitState::Open);

        match cb.allow() {
            Err(Error::CircuitOpen { name, state }) => {
                assert_eq!(name, "orders");
                assert_eq!(state, CircuitState::Open);
            }
            other => panic!("expected CircuitOpen, got {:?}", other.map(|_| ())),
        };
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout_and_close_on_successes() {
        let cb = CircuitBreaker::new(consecutive(2));
        fail(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let first = cb.allow().unwrap();
        let second = cb.allow().unwrap();
        assert!(matches!(
            cb.allow(),
            Err(Error::CircuitOpen {
                state: CircuitState::HalfOpen,
                ..
            })
        ));

        first.success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        second.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(consecutive(1));
        fail(&cb);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_clears_counts() {
        let policy = consecutive(3).with_interval(Duration::from_secs(10));
        let cb = CircuitBreaker::new(policy);
        fail(&cb);
        fail(&cb);
        assert_eq!(cb.counts().consecutive_failures, 2);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.counts(), Counts::default());
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_generation_ignored() {
        let cb = CircuitBreaker::new(consecutive(1));
        let slow = cb.allow().unwrap();
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);

        // Outcome from before the trip must not affect the new generation.
        slow.success();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test]
    async fn test_dropped_permit_counts_as_failure() {
        let cb = CircuitBreaker::new(consecutive(1));
        drop(cb.allow().unwrap());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_execute_records_outcomes() {
        let cb = CircuitBreaker::new(consecutive(5));
        let ok = cb.execute(|| async { Ok(1) }).await.unwrap();
        assert_eq!(ok, 1);
        let err = cb.execute(|| async { Err::<(), _>(Error::Timeout) }).await;
        assert!(matches!(err, Err(Error::Timeout)));

        let counts = cb.counts();
        assert_eq!(counts.requests, 2);
        assert_eq!(counts.total_successes, 1);
        assert_eq!(counts.total_failures, 1);
        assert_eq!(counts.consecutive_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_outcomes_are_counted() {
        let cb = Arc::new(CircuitBreaker::new(
            CircuitBreakerPolicy::new("test").with_ready_to_trip(|_| false),
        ));

        let mut tasks = Vec::new();
        for i in 0..64 {
            let cb = Arc::clone(&cb);
            tasks.push(tokio::spawn(async move {
                let permit = cb.allow().unwrap();
                tokio::task::yield_now().await;
                if i % 2 == 0 {
                    permit.success();
                } else {
                    permit.failure();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let counts = cb.counts();
        assert_eq!(counts.requests, 64);
        assert_eq!(counts.total_successes, 32);
        assert_eq!(counts.total_failures, 32);
    }
}
