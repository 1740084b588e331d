//! Query client: staleness decisions, deduplicated fetching with retry,
//! observer accounting and the background eviction sweep.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use freshet_core::{QueryClient, QueryConfig};
//!
//! # async fn demo() -> freshet_core::QueryResult<()> {
//! let config = QueryConfig::builder().stale_time(Duration::from_secs(60)).build()?;
//! let client = QueryClient::from_fn(config, |user_id: u64| async move {
//!     Ok::<_, std::io::Error>(format!("user-{user_id}"))
//! })?;
//!
//! client.retain(&7);
//! client.ensure_query(&7).await;
//! assert_eq!(client.read(&7).and_then(|r| r.data), Some("user-7".to_string()));
//! client.release(&7);
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use freshet_common::resilience::RetryExecutor;
use freshet_common::time::{Clock, SystemClock};
use freshet_common::CommonError;
use futures::future::join_all;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::QueryConfig;
use crate::erased::{AnyQueryClient, QueryClientAdapter};
use crate::error::{QueryError, QueryResult};
use crate::fetcher::{FnFetcher, QueryFetcher};
use crate::gc::Sweeper;
use crate::inflight::{FetchHandle, InFlightRegistry};
use crate::observer::QueryObserver;
use crate::record::{QueryData, QueryKey, Record};
use crate::store::{QueryStore, Subscription};

/// Shared handle to a query cache for one key and payload type
///
/// Clones share the same cache. The sweep stops when [`QueryClient::shutdown`]
/// is called or the last clone is dropped.
pub struct QueryClient<K, T> {
    inner: Arc<ClientInner<K, T>>,
}

struct ClientInner<K, T> {
    config: QueryConfig,
    store: QueryStore<K, T>,
    in_flight: InFlightRegistry<K, T>,
    fetcher: Arc<dyn QueryFetcher<K, T>>,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl<K, T> Drop for ClientInner<K, T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<K, T> Clone for QueryClient<K, T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K: QueryKey, T: QueryData> QueryClient<K, T> {
    /// Create a client and start its eviction sweep.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Config` for an invalid configuration and
    /// `QueryError::Common` when called outside a tokio runtime.
    pub fn new<F>(config: QueryConfig, fetcher: F) -> QueryResult<Self>
    where
        F: QueryFetcher<K, T>,
    {
        Self::with_clock(config, fetcher, Arc::new(SystemClock))
    }

    /// Create a client from an async closure
    ///
    /// # Errors
    ///
    /// See [`QueryClient::new`].
    pub fn from_fn<F, Fut, E>(config: QueryConfig, f: F) -> QueryResult<Self>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        Self::new(config, FnFetcher::new(f))
    }

    /// Create a client reading wall time from `clock`
    ///
    /// # Errors
    ///
    /// See [`QueryClient::new`].
    pub fn with_clock<F>(config: QueryConfig, fetcher: F, clock: Arc<dyn Clock>) -> QueryResult<Self>
    where
        F: QueryFetcher<K, T>,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            QueryError::from(CommonError::internal_with_context(e.to_string(), "QueryClient::new"))
        })?;

        let store = QueryStore::new();
        let shutdown = CancellationToken::new();
        Sweeper::new(store.clone(), Arc::clone(&clock), config.cache_time, config.gc_interval)
            .spawn(&runtime, shutdown.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                store,
                in_flight: InFlightRegistry::new(),
                fetcher: Arc::new(fetcher),
                clock,
                runtime,
                shutdown,
            }),
        })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Fetch `key` if it is absent or stale, returning once that fetch has
    /// settled. Failures are recorded in the cache, never returned.
    pub async fn ensure_query(&self, key: &K) {
        self.ensure_query_with(key, false).await;
    }

    /// Like [`QueryClient::ensure_query`], fetching regardless of staleness
    /// when `force` is set.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_query_with(&self, key: &K, force: bool) {
        // A running fetch is joined whatever its loading timestamp says.
        let joined = self.inner.in_flight.join_or_start_if(
            key,
            || force || self.is_stale(key),
            || self.start_fetch(key),
        );

        match joined {
            Some((handle, started)) => Self::await_operation(key, handle, started).await,
            None => debug!("Query is fresh; skipping fetch"),
        }
    }

    fn is_stale(&self, key: &K) -> bool {
        let now = self.inner.clock.system_time();
        self.inner
            .store
            .get(key)
            .map_or(true, |record| record.is_stale(now, self.inner.config.stale_time))
    }

    /// Current record for `key`
    pub fn read(&self, key: &K) -> Option<Record<T>> {
        self.inner.store.get(key)
    }

    /// Stream of records for `key`, starting with the current one
    pub fn subscribe(&self, key: &K) -> Subscription<T> {
        self.inner.store.subscribe(key)
    }

    /// Register an observer of `key`; observed records are never evicted
    pub fn retain(&self, key: &K) {
        let observers = self.inner.store.retain(key);
        debug!(?key, observers, "Query retained");
    }

    /// Unregister an observer of `key`. Excess releases are ignored.
    pub fn release(&self, key: &K) {
        if let Some(observers) = self.inner.store.release(key) {
            debug!(?key, observers, "Query released");
        }
    }

    /// Refetch every observed record last updated more than
    /// `focus_activity_margin` ago, all keys concurrently.
    #[instrument(skip(self), level = "debug")]
    pub async fn refetch_all_stale(&self) {
        let now = self.inner.clock.system_time();
        let keys =
            self.inner.store.collect_stale_observed(now, self.inner.config.focus_activity_margin);
        if keys.is_empty() {
            return;
        }

        info!(count = keys.len(), "Refetching stale observed queries");
        join_all(keys.iter().map(|key| self.fetch(key))).await;
    }

    /// Foreground hook: when `refetch_on_focus` is set, starts
    /// [`QueryClient::refetch_all_stale`] in the background and returns its
    /// task.
    pub fn app_reached_foreground(&self) -> Option<JoinHandle<()>> {
        if !self.inner.config.refetch_on_focus {
            debug!("Refetch on focus disabled");
            return None;
        }
        let client = self.clone();
        Some(self.inner.runtime.spawn(async move { client.refetch_all_stale().await }))
    }

    /// Stop the eviction sweep and cut short any retry waits. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("Query client shutting down");
            self.inner.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of fetch operations currently running
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Type-erased view of this client
    pub fn erase(&self) -> Arc<dyn AnyQueryClient> {
        Arc::new(QueryClientAdapter::new(self.clone()))
    }

    /// Retain `key` until the returned guard is dropped
    pub fn observe(&self, key: K) -> QueryObserver<T> {
        QueryObserver::new(self.erase(), key)
    }

    async fn fetch(&self, key: &K) {
        let (handle, started) = self.inner.in_flight.join_or_start(key, || self.start_fetch(key));
        Self::await_operation(key, handle, started).await;
    }

    async fn await_operation(key: &K, handle: FetchHandle<T>, started: bool) {
        if !started {
            debug!(?key, "Joining in-flight fetch");
        }
        // The outcome is already in the store.
        let _ = handle.await;
    }

    /// Mark `key` loading and spawn its fetch operation. Runs under the
    /// registry lock.
    fn start_fetch(&self, key: &K) -> FetchHandle<T> {
        let inner = &self.inner;
        let now = inner.clock.system_time();
        inner.store.update(key, |previous| Record::loading_from(previous, now));

        let operation = FetchOperation {
            key: key.clone(),
            store: inner.store.clone(),
            in_flight: inner.in_flight.clone(),
            fetcher: Arc::clone(&inner.fetcher),
            clock: Arc::clone(&inner.clock),
            executor: RetryExecutor::with_cancellation(
                inner.config.retry.clone(),
                inner.shutdown.clone(),
            ),
        };
        let task = inner.runtime.spawn(operation.run());

        async move {
            task.await.unwrap_or_else(|e| {
                Err(CommonError::task_cancelled_with_reason("query-fetch", e.to_string()).into())
            })
        }
        .boxed()
        .shared()
    }
}

/// One spawned fetch: retry loop, result write, registry cleanup
struct FetchOperation<K, T> {
    key: K,
    store: QueryStore<K, T>,
    in_flight: InFlightRegistry<K, T>,
    fetcher: Arc<dyn QueryFetcher<K, T>>,
    clock: Arc<dyn Clock>,
    executor: RetryExecutor,
}

impl<K: QueryKey, T: QueryData> FetchOperation<K, T> {
    #[instrument(skip(self), fields(key = ?self.key), level = "debug")]
    async fn run(self) -> QueryResult<T> {
        let attempts = AssertUnwindSafe(self.executor.execute_with_outcome(|_attempt| {
            let fetcher = Arc::clone(&self.fetcher);
            let key = self.key.clone();
            async move { fetcher.fetch(key).await }
        }))
        .catch_unwind()
        .await;

        let result = match attempts {
            Ok(outcome) => {
                debug!(attempts = outcome.attempts, ok = outcome.result.is_ok(), "Fetch settled");
                outcome.result
            }
            Err(_) => Err(CommonError::internal_with_context("fetcher panicked", "query-fetch").into()),
        };

        let now = self.clock.system_time();
        match &result {
            Ok(data) => {
                self.store.update(&self.key, |previous| {
                    Record::success(data.clone(), now, previous.map_or(0, |r| r.observers))
                });
            }
            Err(err) => {
                warn!(error = %err, "Fetch failed");
                self.store.update(&self.key, |previous| {
                    Record::failure(err.clone(), now, previous.map_or(0, |r| r.observers))
                });
            }
        }

        self.in_flight.clear(&self.key);
        result
    }
}
