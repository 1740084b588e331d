//! Cache store: records plus per-key update subscriptions
//!
//! All state sits behind one `parking_lot::Mutex`. Every public operation is
//! a single short critical section, so operations are atomic relative to each
//! other and a subscriber can never observe a record out of order.
//!
//! Subscribers get an unbounded channel each. A `set` pushes the new record
//! into every channel of its key before returning; eviction drops the
//! senders, which ends the streams cleanly.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::record::{QueryData, QueryKey, Record};

type SubscriberId = u64;

struct StoreState<K, T> {
    records: HashMap<K, Record<T>>,
    subscribers: HashMap<K, HashMap<SubscriberId, UnboundedSender<Record<T>>>>,
    next_subscriber_id: SubscriberId,
}

impl<K: QueryKey, T: QueryData> StoreState<K, T> {
    fn notify(&mut self, key: &K, record: &Record<T>) {
        if let Some(bucket) = self.subscribers.get_mut(key) {
            bucket.retain(|_, sender| sender.send(record.clone()).is_ok());
            if bucket.is_empty() {
                self.subscribers.remove(key);
            }
        }
    }

    fn unsubscribe(&mut self, key: &K, id: SubscriberId) {
        if let Some(bucket) = self.subscribers.get_mut(key) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.subscribers.remove(key);
            }
        }
    }
}

/// Key → record mapping with per-key multicast of every update
pub struct QueryStore<K, T> {
    state: Arc<Mutex<StoreState<K, T>>>,
}

impl<K, T> Clone for QueryStore<K, T> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<K: QueryKey, T: QueryData> Default for QueryStore<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: QueryKey, T: QueryData> QueryStore<K, T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                records: HashMap::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
            })),
        }
    }

    /// Snapshot of the record for `key`
    pub fn get(&self, key: &K) -> Option<Record<T>> {
        self.state.lock().records.get(key).cloned()
    }

    /// Replace the record for `key` and push it to every live subscriber
    /// before returning.
    pub fn set(&self, key: K, record: Record<T>) {
        let mut state = self.state.lock();
        state.notify(&key, &record);
        state.records.insert(key, record);
    }

    /// Atomically compute a new record from the current one, store it and
    /// notify subscribers. Returns the stored record.
    pub fn update<F>(&self, key: &K, f: F) -> Record<T>
    where
        F: FnOnce(Option<&Record<T>>) -> Record<T>,
    {
        let mut state = self.state.lock();
        let record = f(state.records.get(key));
        state.notify(key, &record);
        state.records.insert(key.clone(), record.clone());
        record
    }

    /// Increment the observer count, creating an idle record if absent.
    ///
    /// Returns the new count.
    pub fn retain(&self, key: &K) -> usize {
        let mut state = self.state.lock();
        let record = state.records.entry(key.clone()).or_insert_with(Record::idle);
        record.observers += 1;
        record.observers
    }

    /// Decrement the observer count, floored at zero. No-op if absent.
    pub fn release(&self, key: &K) -> Option<usize> {
        let mut state = self.state.lock();
        let record = state.records.get_mut(key)?;
        record.observers = record.observers.saturating_sub(1);
        Some(record.observers)
    }

    /// Stream of records for `key`: the current record first (if any), then
    /// every later update until the subscription is dropped or the key is
    /// evicted.
    pub fn subscribe(&self, key: &K) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut state = self.state.lock();
        if let Some(current) = state.records.get(key) {
            // Cannot fail: the receiver is still in hand.
            let _ = sender.send(current.clone());
        }
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.entry(key.clone()).or_default().insert(id, sender);
        drop(state);

        let weak: Weak<Mutex<StoreState<K, T>>> = Arc::downgrade(&self.state);
        let key = key.clone();
        Subscription::open(
            receiver,
            Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.lock().unsubscribe(&key, id);
                }
            }),
        )
    }

    /// Remove every unobserved record idle for longer than `cache_time`,
    /// ending all of its subscriptions. Returns the number removed.
    pub fn evict_expired(&self, now: SystemTime, cache_time: Duration) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<K> = state
            .records
            .iter()
            .filter(|(_, record)| record.is_expired(now, cache_time))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.records.remove(key);
            // Dropping the senders closes each subscriber's stream.
            state.subscribers.remove(key);
            debug!(?key, "evicted expired query");
        }

        expired.len()
    }

    /// Keys with at least one observer whose last update is older than
    /// `activity_margin`.
    pub fn collect_stale_observed(&self, now: SystemTime, activity_margin: Duration) -> Vec<K> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|(_, record)| record.observers > 0 && record.age(now) > activity_margin)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Number of live subscriptions for `key`
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.state.lock().subscribers.get(key).map_or(0, HashMap::len)
    }
}

/// Stream of record updates for one key
///
/// Dropping the subscription unregisters it. A closed subscription yields
/// nothing.
pub struct Subscription<T> {
    receiver: Option<UnboundedReceiver<Record<T>>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    fn open(receiver: UnboundedReceiver<Record<T>>, on_drop: Box<dyn FnOnce() + Send>) -> Self {
        Self { receiver: Some(receiver), on_drop: Some(on_drop) }
    }

    /// Subscription that is already finished
    pub fn closed() -> Self {
        Self { receiver: None, on_drop: None }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Record<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().receiver.as_mut() {
            Some(receiver) => receiver.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("open", &self.receiver.is_some()).finish()
    }
}
