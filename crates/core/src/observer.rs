//! Observer guard: one retained key for the lifetime of a value
//!
//! A [`QueryObserver`] retains its key on creation and releases it on drop,
//! so a view cannot forget the release. [`QueryObserver::into_updates`] turns
//! it into a stream of decoded states that starts a fetch if needed and keeps
//! the key retained until the stream is dropped.

use std::any::Any;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures::FutureExt;

use crate::erased::{AnyKey, AnyQueryClient};
use crate::phase::QueryState;
use crate::record::QueryData;

/// Retained interest in one key, decoded as `U`
pub struct QueryObserver<U> {
    client: Arc<dyn AnyQueryClient>,
    key: Arc<AnyKey>,
    _output: PhantomData<fn() -> U>,
}

impl<U: QueryData> QueryObserver<U> {
    /// Retain `key` on `client`
    pub fn new<K: Any + Send + Sync>(client: Arc<dyn AnyQueryClient>, key: K) -> Self {
        let key: Arc<AnyKey> = Arc::new(key);
        client.retain_any(key.as_ref());
        Self { client, key, _output: PhantomData }
    }

    /// State of the current record, idle if there is none
    pub fn state(&self) -> QueryState<U> {
        self.client
            .read_any(self.key.as_ref())
            .map(|record| QueryState::new(record.decode::<U>()))
            .unwrap_or_default()
    }

    /// Fetch the key if it is absent or stale
    pub async fn ensure(&self) {
        self.client.ensure_query_any(self.key.as_ref()).await;
    }

    /// Stream of states: the current one (if any), then every update.
    ///
    /// An ensure runs alongside the stream. The key stays retained until the
    /// stream is dropped.
    pub fn into_updates(self) -> ObservedUpdates<U> {
        let records = self.client.subscribe_any(self.key.as_ref());

        let client = Arc::clone(&self.client);
        let key = Arc::clone(&self.key);
        let ensure = async move { client.ensure_query_any(key.as_ref()).await }
            .into_stream()
            .filter_map(|()| futures::future::ready(None::<QueryState<U>>));

        let states = stream::select(records.map(|record| QueryState::new(record.decode::<U>())), ensure);
        ObservedUpdates { states: states.boxed(), _observer: self }
    }
}

impl<U> Drop for QueryObserver<U> {
    fn drop(&mut self) {
        self.client.release_any(self.key.as_ref());
    }
}

impl<U> std::fmt::Debug for QueryObserver<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver").field("output", &std::any::type_name::<U>()).finish()
    }
}

/// Stream returned by [`QueryObserver::into_updates`]
pub struct ObservedUpdates<U> {
    states: BoxStream<'static, QueryState<U>>,
    _observer: QueryObserver<U>,
}

impl<U> Stream for ObservedUpdates<U> {
    type Item = QueryState<U>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.states.poll_next_unpin(cx)
    }
}
