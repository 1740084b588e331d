//! Client configuration
//!
//! [`QueryConfig`] is the runtime form handed to a client; it owns the retry
//! policy closure. [`QuerySettings`] is its serde form, with every duration in
//! whole seconds, produced by the [`loader`].

pub mod loader;

use std::time::Duration;

use freshet_common::resilience::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use freshet_common::resilience::{BackoffStrategy, RetryPolicy};
use freshet_common::{duration_secs, CommonError};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Default seconds before a record is considered stale
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);
/// Default seconds of unobserved idleness before eviction
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(300);
/// Default eviction sweep period
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(5);
/// Default minimum age for a record to be refetched on foreground
pub const DEFAULT_FOCUS_ACTIVITY_MARGIN: Duration = Duration::from_secs(1);

/// Runtime configuration of a query client
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Age after which a record is refetched by the next `ensure_query`
    pub stale_time: Duration,
    /// Unobserved idleness after which a record is evicted
    pub cache_time: Duration,
    pub retry: RetryPolicy,
    /// Whether `app_reached_foreground` refetches stale observed records
    pub refetch_on_focus: bool,
    /// Period of the eviction sweep
    pub gc_interval: Duration,
    /// Records updated more recently than this are skipped by
    /// `refetch_all_stale`
    pub focus_activity_margin: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            cache_time: DEFAULT_CACHE_TIME,
            retry: RetryPolicy::default(),
            refetch_on_focus: true,
            gc_interval: DEFAULT_GC_INTERVAL,
            focus_activity_margin: DEFAULT_FOCUS_ACTIVITY_MARGIN,
        }
    }
}

impl QueryConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> QueryConfigBuilder {
        QueryConfigBuilder::default()
    }

    /// Check the values a client cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Config` when `cache_time` or `gc_interval` is
    /// zero.
    pub fn validate(&self) -> QueryResult<()> {
        if self.cache_time.is_zero() {
            return Err(QueryError::config(CommonError::config_field(
                "cache_time",
                "must be greater than zero",
            )));
        }
        if self.gc_interval.is_zero() {
            return Err(QueryError::config(CommonError::config_field(
                "gc_interval",
                "must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Builder for [`QueryConfig`]
#[derive(Debug, Clone, Default)]
pub struct QueryConfigBuilder {
    config: QueryConfig,
}

impl QueryConfigBuilder {
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.config.stale_time = stale_time;
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.config.cache_time = cache_time;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn refetch_on_focus(mut self, enabled: bool) -> Self {
        self.config.refetch_on_focus = enabled;
        self
    }

    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.config.gc_interval = interval;
        self
    }

    pub fn focus_activity_margin(mut self, margin: Duration) -> Self {
        self.config.focus_activity_margin = margin;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// See [`QueryConfig::validate`].
    pub fn build(self) -> QueryResult<QueryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// File and environment form of [`QueryConfig`]
///
/// Missing fields take the defaults. The retry policy is expressed as an
/// attempt limit plus the cap of the doubling backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    #[serde(with = "duration_secs")]
    pub stale_time: Duration,
    #[serde(with = "duration_secs")]
    pub cache_time: Duration,
    pub retry_max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub retry_max_delay: Duration,
    pub refetch_on_focus: bool,
    #[serde(with = "duration_secs")]
    pub gc_interval: Duration,
    #[serde(with = "duration_secs")]
    pub focus_activity_margin: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            cache_time: DEFAULT_CACHE_TIME,
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_max_delay: DEFAULT_MAX_DELAY,
            refetch_on_focus: true,
            gc_interval: DEFAULT_GC_INTERVAL,
            focus_activity_margin: DEFAULT_FOCUS_ACTIVITY_MARGIN,
        }
    }
}

impl QuerySettings {
    /// Build and validate the runtime configuration
    ///
    /// # Errors
    ///
    /// See [`QueryConfig::validate`].
    pub fn into_config(self) -> QueryResult<QueryConfig> {
        let retry = if self.retry_max_attempts == 0 {
            RetryPolicy::never()
        } else {
            RetryPolicy::with_backoff(
                self.retry_max_attempts,
                BackoffStrategy::doubling(self.retry_max_delay),
            )
        };

        QueryConfig::builder()
            .stale_time(self.stale_time)
            .cache_time(self.cache_time)
            .retry(retry)
            .refetch_on_focus(self.refetch_on_focus)
            .gc_interval(self.gc_interval)
            .focus_activity_margin(self.focus_activity_margin)
            .build()
    }
}
