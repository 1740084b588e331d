//! Retry policy and executor with interruptible backoff
//!
//! Attempts are numbered from 1. After attempt `n` fails the executor either
//! raises the failure (last attempt, or the policy yields no delay) or sleeps
//! for the policy's delay and runs attempt `n + 1`. Only the failure of the
//! final attempt is surfaced; earlier failures are logged and dropped.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Maps a failed attempt number to the wait before the next attempt, or
/// `None` to stop retrying.
pub type DelayFn = Arc<dyn Fn(u32) -> Option<Duration> + Send + Sync>;

/// Default number of attempts for [`RetryPolicy::default`]
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for the default exponential backoff
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone)]
#[allow(unpredictable_function_pointer_comparisons)]
#[derive(PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt * increment)
    Linear { initial_delay: Duration, increment: Duration },
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
    /// Custom backoff function
    Custom(fn(u32) -> Duration),
}

impl BackoffStrategy {
    /// Exponential doubling from one second, capped at `max_delay`.
    ///
    /// `calculate_delay(n)` is `min(max_delay, 2^n s)`.
    pub fn doubling(max_delay: Duration) -> Self {
        Self::Exponential { initial_delay: Duration::from_secs(1), base: 2.0, max_delay }
    }

    /// Calculate the delay that follows failed attempt `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Linear { initial_delay, increment } => {
                *initial_delay + increment.saturating_mul(attempt)
            }
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = whole_millis(*initial_delay) * base.powi(exponent);
                Duration::from_millis(saturating_millis(delay.min(whole_millis(*max_delay))))
            }
            BackoffStrategy::Custom(f) => f(attempt),
        }
    }
}

/// Milliseconds of `duration` as a float, capped at `u32::MAX` (about 49 days)
fn whole_millis(duration: Duration) -> f64 {
    f64::from(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX))
}

/// Float → integer `as` saturates: NaN and negatives become 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn saturating_millis(ms: f64) -> u64 {
    ms as u64
}

/// Retry policy: attempt limit plus attempt → delay-or-stop function
///
/// `max_attempts == 0` behaves like `1`: the operation runs exactly once.
///
/// ```
/// use std::time::Duration;
///
/// use freshet_common::resilience::RetryPolicy;
///
/// let policy = RetryPolicy::new(5, |attempt| Some(Duration::from_millis(100 * u64::from(attempt))));
/// assert_eq!(policy.max_attempts(), 5);
/// assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
///
/// let never = RetryPolicy::never();
/// assert_eq!(never.total_attempts(), 1);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayFn,
}

impl RetryPolicy {
    /// Create a policy from an attempt limit and a delay function
    pub fn new<F>(max_attempts: u32, delay: F) -> Self
    where
        F: Fn(u32) -> Option<Duration> + Send + Sync + 'static,
    {
        Self { max_attempts, delay: Arc::new(delay) }
    }

    /// Policy that never retries (single attempt)
    pub fn never() -> Self {
        Self::new(0, |_| None)
    }

    /// Policy backed by one of the standard backoff strategies
    pub fn with_backoff(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self::new(max_attempts, move |attempt| Some(backoff.calculate_delay(attempt)))
    }

    /// Configured attempt limit, as given
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of times the operation may actually run (`max(1, max_attempts)`)
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt `attempt`, `None` to stop
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (self.delay)(attempt)
    }

    /// Whether `attempt` is the final permitted attempt
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt >= self.total_attempts()
    }
}

impl Default for RetryPolicy {
    /// Three attempts with `min(30s, 2^n s)` backoff
    fn default() -> Self {
        Self::with_backoff(DEFAULT_MAX_ATTEMPTS, BackoffStrategy::doubling(DEFAULT_MAX_DELAY))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Success value, or the failure of the last attempt that ran
    pub result: Result<T, E>,
    /// Number of attempts that ran
    pub attempts: u32,
    /// Total time spent waiting between attempts
    pub total_delay: Duration,
    /// Whether a backoff wait was cut short by cancellation
    pub interrupted: bool,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Runs an async operation under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancellation: CancellationToken,
}

impl RetryExecutor {
    /// Create an executor whose waits can only end by elapsing
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_cancellation(policy, CancellationToken::new())
    }

    /// Create an executor whose waits end early once `cancellation` fires
    pub fn with_cancellation(policy: RetryPolicy, cancellation: CancellationToken) -> Self {
        Self { policy, cancellation }
    }

    /// The policy this executor applies
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    ///
    /// The operation receives the 1-based attempt number.
    #[instrument(skip_all, fields(max_attempts = self.policy.total_attempts()))]
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 1;
        let mut total_delay = Duration::ZERO;

        loop {
            debug!(attempt, "executing operation");

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        total_delay,
                        interrupted: false,
                    };
                }
                Err(error) => error,
            };

            if self.policy.is_last_attempt(attempt) {
                warn!(attempt, error = %error, "all retry attempts exhausted");
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    total_delay,
                    interrupted: false,
                };
            }

            let Some(delay) = self.policy.delay_for(attempt) else {
                debug!(attempt, error = %error, "retry policy declined another attempt");
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    total_delay,
                    interrupted: false,
                };
            };

            warn!(attempt, ?delay, error = %error, "operation failed, retrying after delay");
            tokio::select! {
                () = self.cancellation.cancelled() => {
                    debug!(attempt, "retry wait interrupted by cancellation");
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                        total_delay,
                        interrupted: true,
                    };
                }
                () = tokio::time::sleep(delay) => {}
            }

            total_delay += delay;
            attempt += 1;
        }
    }
}
