//! Type-erased client surface
//!
//! Lets code that only knows keys and payloads as `dyn Any` (view layers,
//! dependency containers) drive any concrete [`QueryClient`]. A key of the
//! wrong type is treated as unknown: reads are absent, streams end
//! immediately and the rest are no-ops. Payloads are recovered with
//! [`AnyRecord::decode`], which reports a type mismatch as an error phase.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::client::QueryClient;
use crate::error::QueryError;
use crate::phase::QueryPhase;
use crate::record::{QueryData, QueryKey, QueryStatus, Record};

/// Dynamically typed key
pub type AnyKey = dyn Any + Send + Sync;

/// Record with a dynamically typed payload
#[derive(Clone)]
pub struct AnyRecord {
    pub data: Option<Arc<dyn Any + Send + Sync>>,
    pub error: Option<QueryError>,
    pub status: QueryStatus,
}

impl AnyRecord {
    pub fn from_record<T: QueryData>(record: Record<T>) -> Self {
        Self {
            data: record.data.map(|data| Arc::new(data) as Arc<dyn Any + Send + Sync>),
            error: record.error,
            status: record.status,
        }
    }

    /// Phase of this record with the payload read as `U`
    pub fn decode<U: Clone + 'static>(&self) -> QueryPhase<U> {
        match self.status {
            QueryStatus::Idle => QueryPhase::Idle,
            QueryStatus::Loading => QueryPhase::Loading,
            QueryStatus::Success => {
                match self.data.as_ref().and_then(|data| data.downcast_ref::<U>()) {
                    Some(value) => QueryPhase::Success(value.clone()),
                    None => QueryPhase::Error(QueryError::type_mismatch::<U>()),
                }
            }
            QueryStatus::Error => {
                QueryPhase::Error(self.error.clone().unwrap_or(QueryError::MissingError))
            }
        }
    }
}

impl fmt::Debug for AnyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyRecord")
            .field("has_data", &self.data.is_some())
            .field("error", &self.error)
            .field("status", &self.status)
            .finish()
    }
}

/// Query operations over dynamically typed keys
#[async_trait]
pub trait AnyQueryClient: Send + Sync {
    fn read_any(&self, key: &AnyKey) -> Option<AnyRecord>;

    async fn ensure_query_any(&self, key: &AnyKey);

    /// Updates for `key`; ends immediately for an unknown key type
    fn subscribe_any(&self, key: &AnyKey) -> BoxStream<'static, AnyRecord>;

    fn retain_any(&self, key: &AnyKey);

    fn release_any(&self, key: &AnyKey);
}

/// [`AnyQueryClient`] over a concrete [`QueryClient`]
pub struct QueryClientAdapter<K, T> {
    client: QueryClient<K, T>,
}

impl<K: QueryKey, T: QueryData> QueryClientAdapter<K, T> {
    pub fn new(client: QueryClient<K, T>) -> Self {
        Self { client }
    }

    fn key<'a>(&self, key: &'a AnyKey) -> Option<&'a K> {
        let typed = key.downcast_ref::<K>();
        if typed.is_none() {
            debug!(expected = type_name::<K>(), "Ignoring key of unexpected type");
        }
        typed
    }
}

#[async_trait]
impl<K: QueryKey, T: QueryData> AnyQueryClient for QueryClientAdapter<K, T> {
    fn read_any(&self, key: &AnyKey) -> Option<AnyRecord> {
        self.client.read(self.key(key)?).map(AnyRecord::from_record)
    }

    async fn ensure_query_any(&self, key: &AnyKey) {
        if let Some(key) = self.key(key) {
            self.client.ensure_query(key).await;
        }
    }

    fn subscribe_any(&self, key: &AnyKey) -> BoxStream<'static, AnyRecord> {
        match self.key(key) {
            Some(key) => self.client.subscribe(key).map(AnyRecord::from_record).boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn retain_any(&self, key: &AnyKey) {
        if let Some(key) = self.key(key) {
            self.client.retain(key);
        }
    }

    fn release_any(&self, key: &AnyKey) {
        if let Some(key) = self.key(key) {
            self.client.release(key);
        }
    }
}

/// Client with no data, used where no real client is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueryClient;

#[async_trait]
impl AnyQueryClient for NoopQueryClient {
    fn read_any(&self, _key: &AnyKey) -> Option<AnyRecord> {
        None
    }

    async fn ensure_query_any(&self, _key: &AnyKey) {}

    fn subscribe_any(&self, _key: &AnyKey) -> BoxStream<'static, AnyRecord> {
        stream::empty().boxed()
    }

    fn retain_any(&self, _key: &AnyKey) {}

    fn release_any(&self, _key: &AnyKey) {}
}
