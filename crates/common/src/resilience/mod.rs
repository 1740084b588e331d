//! Resilience patterns for fault-tolerant fetching
//!
//! Provides the retry policy consumed by the query client: an attempt limit
//! plus a function mapping the attempt number to a backoff delay (or to
//! "stop"), and an executor that runs an async operation under that policy.
//!
//! Delays are interruptible through a `tokio_util` cancellation token so a
//! client shutdown never waits out a long backoff.

pub mod retry;

pub use retry::{BackoffStrategy, DelayFn, RetryExecutor, RetryOutcome, RetryPolicy};
