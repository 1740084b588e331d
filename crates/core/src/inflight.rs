//! Registry of running fetch operations, one per key

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::error::QueryResult;
use crate::record::{QueryData, QueryKey};

/// Cloneable handle to a running fetch; every clone resolves to the same
/// result.
pub type FetchHandle<T> = Shared<BoxFuture<'static, QueryResult<T>>>;

/// Key → in-flight operation
///
/// Guarded by its own lock, independent of the store. The only lock nesting
/// in the crate is registry → store, inside the `join_or_start` family.
pub struct InFlightRegistry<K, T> {
    operations: Arc<Mutex<HashMap<K, FetchHandle<T>>>>,
}

impl<K, T> Clone for InFlightRegistry<K, T> {
    fn clone(&self) -> Self {
        Self { operations: Arc::clone(&self.operations) }
    }
}

impl<K: QueryKey, T: QueryData> Default for InFlightRegistry<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: QueryKey, T: QueryData> InFlightRegistry<K, T> {
    pub fn new() -> Self {
        Self { operations: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn get(&self, key: &K) -> Option<FetchHandle<T>> {
        self.operations.lock().get(key).cloned()
    }

    pub fn set(&self, key: K, handle: FetchHandle<T>) {
        self.operations.lock().insert(key, handle);
    }

    pub fn clear(&self, key: &K) {
        self.operations.lock().remove(key);
    }

    /// Return the running operation for `key`, or start one with `start` and
    /// register it, all under the registry lock.
    ///
    /// The flag is `true` when this call started the operation.
    pub fn join_or_start<F>(&self, key: &K, start: F) -> (FetchHandle<T>, bool)
    where
        F: FnOnce() -> FetchHandle<T>,
    {
        let mut operations = self.operations.lock();
        if let Some(existing) = operations.get(key) {
            return (existing.clone(), false);
        }
        let handle = start();
        operations.insert(key.clone(), handle.clone());
        (handle, true)
    }

    /// Join the running operation for `key`; with none running, start one
    /// only when `should_start` returns `true`.
    ///
    /// `should_start` runs under the registry lock, after the running check,
    /// so a caller can never observe a record marked loading by an operation
    /// it then fails to join. `None` means nothing is running and nothing was
    /// started.
    pub fn join_or_start_if<P, F>(
        &self,
        key: &K,
        should_start: P,
        start: F,
    ) -> Option<(FetchHandle<T>, bool)>
    where
        P: FnOnce() -> bool,
        F: FnOnce() -> FetchHandle<T>,
    {
        let mut operations = self.operations.lock();
        if let Some(existing) = operations.get(key) {
            return Some((existing.clone(), false));
        }
        if !should_start() {
            return None;
        }
        let handle = start();
        operations.insert(key.clone(), handle.clone());
        Some((handle, true))
    }

    /// Number of running operations
    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }
}
