//! Retry policy with exponential backoff.
//!
//! A [`RetryPolicy`] decides how many attempts a call gets and how long to
//! wait before each attempt after the first. Which failures are eligible for
//! a retry is fixed: transport errors, timeouts, circuit-breaker rejections
//! and 5xx, 429 and 408 responses (see [`is_retryable_status`]).

use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// Defines how many times and how quickly a failed call is attempted again.
///
/// Before attempt `n` (1-based, `n >= 2`) the client waits
/// `min(max_backoff, initial_backoff * backoff_factor^(n - 1))`.
///
/// # Examples
///
/// ```
/// use svckit::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(
///     4,
///     Duration::from_millis(100),
///     Duration::from_millis(500),
///     2.0,
/// );
///
/// assert_eq!(policy.backoff_for_attempt(1), Duration::ZERO);
/// assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
/// assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(400));
/// assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    /// Base delay the exponential growth starts from.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied per attempt.
    pub backoff_factor: f64,
    /// Whether to scale each delay by a random factor between 50% and 100%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_millis(100),
            Duration::from_secs(5),
            2.0,
        )
    }
}

impl RetryPolicy {
    /// Creates a policy without jitter. `max_attempts` below 1 is raised to 1.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_factor: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            backoff_factor,
            jitter: false,
        }
    }

    /// Sets the maximum number of attempts, including the first one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the maximum backoff.
    #[must_use]
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Sets the backoff growth factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Enables random jitter on every delay.
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Returns the maximum number of attempts, always at least 1.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait before `attempt` (1-based).
    ///
    /// The first attempt never waits. The result never exceeds
    /// `max_backoff`, also when the computation overflows or the factor is
    /// not a finite number.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(scaled)
            .map(|delay| delay.min(self.max_backoff))
            .unwrap_or(self.max_backoff);

        if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(jitter_factor)
        } else {
            delay
        }
    }
}

/// Returns `true` for statuses the retry loop treats as failures: any 5xx,
/// 429 Too Many Requests and 408 Request Timeout.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(5));
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(!policy.jitter);
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let policy = RetryPolicy::new(
            6,
            Duration::from_millis(100),
            Duration::from_secs(10),
            2.0,
        );

        assert_eq!(policy.backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.backoff_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for_attempt(5), Duration::from_millis(1600));
    }

    #[test]
    fn test_backoff_clamped_to_max() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(100),
            Duration::from_millis(300),
            3.0,
        );
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(300));
        assert_eq!(policy.backoff_for_attempt(1000), Duration::from_millis(300));
    }

    #[test]
    fn test_non_finite_factor_uses_max() {
        let policy = RetryPolicy::default().with_backoff_factor(f64::INFINITY);
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(5));
        let policy = RetryPolicy::default().with_backoff_factor(f64::NAN);
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(5));
    }

    #[test]
    fn test_max_attempts_at_least_one() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts(), 1);
        assert_eq!(
            RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 1.0).max_attempts(),
            1
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default().with_jitter();
        for _ in 0..100 {
            let delay = policy.backoff_for_attempt(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::OK));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::CONFLICT));
    }
}
