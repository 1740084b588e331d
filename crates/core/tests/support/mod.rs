//! Shared test helpers for `freshet-core` integration tests.
//!
//! Provides a scripted fetcher that records every call and can be told to
//! fail a number of times or to take a while, plus client constructors
//! wired to a `MockClock`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use freshet_common::time::MockClock;
use freshet_core::{QueryClient, QueryConfig, QueryError, QueryFetcher, QueryResult};
use parking_lot::Mutex;

/// Fetcher returning `"{key}-v{n}"` on the n-th successful call per key.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    fail_first: usize,
    latency: Duration,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` calls for every key, then succeed.
    pub fn failing_first(n: usize) -> Self {
        Self { fail_first: n, ..Self::default() }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Sleep for `latency` (tokio time) inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Total calls across all keys
    pub fn calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn calls_for(&self, key: &'static str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QueryFetcher<&'static str, String> for ScriptedFetcher {
    async fn fetch(&self, key: &'static str) -> QueryResult<String> {
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(key).or_insert(0);
            *count += 1;
            *count
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if call <= self.fail_first {
            return Err(QueryError::fetch_message(format!("{key} attempt {call} failed")));
        }
        Ok(format!("{key}-v{}", call - self.fail_first))
    }
}

/// Client over `fetcher` reading time from `clock`
pub fn client_with(
    config: QueryConfig,
    fetcher: &ScriptedFetcher,
    clock: &MockClock,
) -> QueryClient<&'static str, String> {
    freshet_common::testing::init_test_tracing();
    QueryClient::with_clock(config, fetcher.clone(), Arc::new(clock.clone()))
        .expect("test client builds")
}

/// Configuration with the given stale and cache times in seconds
pub fn config(stale_secs: u64, cache_secs: u64) -> QueryConfig {
    QueryConfig::builder()
        .stale_time(Duration::from_secs(stale_secs))
        .cache_time(Duration::from_secs(cache_secs))
        .build()
        .expect("valid test config")
}
