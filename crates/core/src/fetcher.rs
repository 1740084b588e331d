//! The consumer-supplied fetch function

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::{QueryError, QueryResult};
use crate::record::{QueryData, QueryKey};

/// Fetches the payload for a key
///
/// One fetcher serves a whole client. It may be called concurrently for
/// different keys, never concurrently for the same key.
#[async_trait]
pub trait QueryFetcher<K: QueryKey, T: QueryData>: Send + Sync + 'static {
    async fn fetch(&self, key: K) -> QueryResult<T>;
}

/// [`QueryFetcher`] backed by an async closure
///
/// Closure errors are wrapped with [`QueryError::fetch`]; a closure that
/// already returns `QueryError` should implement the trait directly.
///
/// ```
/// use freshet_core::fetcher::{FnFetcher, QueryFetcher};
///
/// # async fn demo() {
/// let fetcher = FnFetcher::new(|id: u32| async move {
///     Ok::<_, std::io::Error>(format!("user-{id}"))
/// });
/// assert_eq!(fetcher.fetch(7).await.unwrap(), "user-7");
/// # }
/// ```
pub struct FnFetcher<F> {
    f: F,
}

impl<F> FnFetcher<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl<K, T, F, Fut, E> QueryFetcher<K, T> for FnFetcher<F>
where
    K: QueryKey,
    T: QueryData,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    async fn fetch(&self, key: K) -> QueryResult<T> {
        (self.f)(key).await.map_err(QueryError::fetch)
    }
}
