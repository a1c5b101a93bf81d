//! Retry policies for the store-facing loops.
//!
//! Every loop that talks to the store (bootstrap, optimistic writes, read
//! and reconcile) takes its pacing and its budget from a [`RetryPolicy`]
//! rather than hard-coding sleeps. The default policy retries forever with
//! a fixed short delay, which keeps the success semantics of an unbounded
//! loop while letting callers bound worst-case latency.

use std::time::{Duration, Instant};

use kgcheck_types::ErrorKind;

// ============================================================================
// Retry Policy
// ============================================================================

/// How many attempts a retry loop may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Retry until the operation succeeds.
    Unbounded,
    /// Give up once this many attempts have failed.
    Attempts(u32),
    /// Give up once the next delay would end past this much elapsed time.
    Deadline(Duration),
}

/// Backoff and budget for one retry loop.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kgcheck::{RetryLimit, RetryPolicy};
/// use kgcheck_types::ErrorKind;
///
/// let policy = RetryPolicy::exponential(Duration::from_millis(10), Duration::from_millis(50))
///     .with_limit(RetryLimit::Attempts(4));
///
/// assert_eq!(policy.delay_for_attempt(0, ErrorKind::Unavailable), Duration::from_millis(10));
/// assert_eq!(policy.delay_for_attempt(2, ErrorKind::Unavailable), Duration::from_millis(40));
/// assert_eq!(policy.delay_for_attempt(3, ErrorKind::Unavailable), Duration::from_millis(50));
/// // Lost races are retried promptly.
/// assert_eq!(policy.delay_for_attempt(3, ErrorKind::Conflict), Duration::from_millis(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per failed attempt (1.0 = fixed delay).
    pub multiplier: f64,
    pub limit: RetryLimit,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            multiplier: 1.0,
            limit: RetryLimit::Unbounded,
        }
    }
}

impl RetryPolicy {
    /// Retries forever with a constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            limit: RetryLimit::Unbounded,
        }
    }

    /// Retries forever, doubling the delay up to `max_delay`.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            limit: RetryLimit::Unbounded,
        }
    }

    /// Retries immediately. Used by tests.
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn with_limit(mut self, limit: RetryLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Computes the delay after the given failed attempt (0-indexed).
    ///
    /// A `Conflict` means another writer won a race, not that the store is
    /// struggling, so it always gets the initial delay.
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32, kind: ErrorKind) -> Duration {
        if kind == ErrorKind::Conflict || self.multiplier <= 1.0 {
            return self.initial_delay;
        }

        let exponent = attempt.min(64) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Starts tracking one run of a retry loop.
    pub fn retrier(&self) -> Retrier {
        Retrier {
            policy: *self,
            failures: 0,
            started: Instant::now(),
        }
    }
}

// ============================================================================
// Retrier
// ============================================================================

/// Tracks the failures of one retry loop against its policy.
#[derive(Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    failures: u32,
    started: Instant,
}

impl Retrier {
    /// Records a failure and returns how long to wait before the next
    /// attempt, or `None` if the budget is spent.
    pub fn next_delay(&mut self, kind: ErrorKind) -> Option<Duration> {
        let attempt = self.failures;
        self.failures = self.failures.saturating_add(1);
        let delay = self.policy.delay_for_attempt(attempt, kind);

        match self.policy.limit {
            RetryLimit::Unbounded => Some(delay),
            RetryLimit::Attempts(max) => (self.failures < max).then_some(delay),
            RetryLimit::Deadline(deadline) => {
                (self.started.elapsed() + delay < deadline).then_some(delay)
            }
        }
    }

    /// Number of failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
