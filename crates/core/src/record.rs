//! Per-key cache records

use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::QueryError;

/// Bounds every query key satisfies
pub trait QueryKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<K> QueryKey for K where K: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Bounds every fetched payload satisfies
pub trait QueryData: Clone + Send + Sync + 'static {}

impl<T> QueryData for T where T: Clone + Send + Sync + 'static {}

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryStatus {
    /// Created (usually by `retain`) but never fetched
    #[default]
    Idle,
    /// A fetch is running, including all of its retries
    Loading,
    /// The last fetch succeeded
    Success,
    /// The last fetch failed after exhausting its retries
    Error,
}

/// Cached state for one key
///
/// `Idle` and `Loading` records keep the data and error of the previous
/// terminal state so callers can keep showing stale data during a refetch.
#[derive(Debug, Clone)]
pub struct Record<T> {
    /// Last successful payload
    pub data: Option<T>,
    /// Last failure
    pub error: Option<QueryError>,
    pub status: QueryStatus,
    /// Time of the last transition to success, error or loading
    pub updated_at: SystemTime,
    /// Number of active holders
    pub observers: usize,
}

impl<T> Record<T> {
    /// Never-fetched record, dated at the epoch so it is immediately stale
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Idle,
            updated_at: UNIX_EPOCH,
            observers: 0,
        }
    }

    /// Successful result at `now`
    pub fn success(data: T, now: SystemTime, observers: usize) -> Self {
        Self { data: Some(data), error: None, status: QueryStatus::Success, updated_at: now, observers }
    }

    /// Failed result at `now`
    pub fn failure(error: QueryError, now: SystemTime, observers: usize) -> Self {
        Self { data: None, error: Some(error), status: QueryStatus::Error, updated_at: now, observers }
    }

    /// Time since the last update, zero if `updated_at` lies after `now`
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.updated_at).unwrap_or_default()
    }

    /// Strictly older than `stale_time`
    pub fn is_stale(&self, now: SystemTime, stale_time: Duration) -> bool {
        self.age(now) > stale_time
    }

    /// Unobserved and idle for longer than `cache_time`
    pub fn is_expired(&self, now: SystemTime, cache_time: Duration) -> bool {
        self.observers == 0 && self.age(now) > cache_time
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }
}

impl<T: Clone> Record<T> {
    /// Loading transition from `previous`, keeping its data, error and
    /// observer count.
    pub fn loading_from(previous: Option<&Self>, now: SystemTime) -> Self {
        match previous {
            Some(prev) => Self {
                data: prev.data.clone(),
                error: prev.error.clone(),
                status: QueryStatus::Loading,
                updated_at: now,
                observers: prev.observers,
            },
            None => Self { status: QueryStatus::Loading, updated_at: now, ..Self::idle() },
        }
    }
}

impl<T> Default for Record<T> {
    fn default() -> Self {
        Self::idle()
    }
}
