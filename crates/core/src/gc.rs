//! Background eviction sweep
//!
//! Every `interval` the sweeper removes records that have had no observers
//! for longer than `cache_time`. The first sweep runs one full interval after
//! start. The loop ends when its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use freshet_common::time::Clock;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::record::{QueryData, QueryKey};
use crate::store::QueryStore;

/// Periodic eviction of expired records
pub struct Sweeper<K, T> {
    store: QueryStore<K, T>,
    clock: Arc<dyn Clock>,
    cache_time: Duration,
    interval: Duration,
}

impl<K: QueryKey, T: QueryData> Sweeper<K, T> {
    pub fn new(
        store: QueryStore<K, T>,
        clock: Arc<dyn Clock>,
        cache_time: Duration,
        interval: Duration,
    ) -> Self {
        Self { store, clock, cache_time, interval }
    }

    /// Run one eviction pass now. Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let evicted = self.store.evict_expired(self.clock.system_time(), self.cache_time);
        if evicted > 0 {
            debug!(sweeper = "gc", event = "sweep", evicted, "Evicted expired queries");
        }
        evicted
    }

    /// Start the periodic loop on `runtime`
    pub fn spawn(self, runtime: &Handle, cancellation: CancellationToken) -> JoinHandle<()> {
        info!(
            sweeper = "gc",
            event = "start",
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Query sweeper started"
        );
        runtime.spawn(self.run(cancellation))
    }

    async fn run(self, cancellation: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancellation.cancelled() => {
                    debug!(sweeper = "gc", event = "stop", "Query sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use freshet_common::time::MockClock;

    use super::*;
    use crate::record::Record;

    fn setup() -> (QueryStore<&'static str, u32>, MockClock, Sweeper<&'static str, u32>) {
        let store = QueryStore::new();
        let clock = MockClock::new();
        let sweeper = Sweeper::new(
            store.clone(),
            Arc::new(clock.clone()),
            Duration::from_secs(600),
            Duration::from_secs(5),
        );
        (store, clock, sweeper)
    }

    /// Validates a manual sweep honours `cache_time` and observers.
    #[test]
    fn test_sweep_once() {
        let (store, clock, sweeper) = setup();
        store.set("unobserved", Record::success(1, clock.system_time(), 0));
        store.set("observed", Record::success(2, clock.system_time(), 1));

        clock.advance_secs(600);
        assert_eq!(sweeper.sweep(), 0);

        clock.advance_secs(1);
        assert_eq!(sweeper.sweep(), 1);
        assert!(store.get(&"unobserved").is_none());
        assert!(store.get(&"observed").is_some());
    }

    /// Validates the periodic loop evicts and stops on cancellation.
    ///
    /// Assertions:
    /// - No sweep happens before the first interval.
    /// - The record is gone after the next tick.
    /// - The task finishes after cancellation.
    #[tokio::test(start_paused = true)]
    async fn test_periodic_loop() {
        let (store, clock, sweeper) = setup();
        store.set("a", Record::success(1, clock.system_time(), 0));
        clock.advance_secs(601);

        let cancellation = CancellationToken::new();
        let handle = sweeper.spawn(&Handle::current(), cancellation.clone());

        time::sleep(Duration::from_secs(4)).await;
        assert!(store.get(&"a").is_some());

        time::sleep(Duration::from_secs(2)).await;
        assert!(store.get(&"a").is_none());

        cancellation.cancel();
        handle.await.expect("sweeper exits cleanly");
    }
}
