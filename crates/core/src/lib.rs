//! # Freshet Core
//!
//! In-memory stale-while-revalidate query cache.
//!
//! A [`QueryClient`] owns one async fetch function. Given a key it serves
//! cached data while fresh, refetches once stale, shares one fetch between
//! concurrent callers, retries failures with backoff and evicts records
//! nobody has observed for `cache_time`.
//!
//! ## Layout
//! - [`store`]: records and per-key update streams
//! - [`inflight`]: one running fetch per key
//! - [`client`]: orchestration and the public operations
//! - [`gc`]: periodic eviction sweep
//! - [`config`]: configuration, builder and file/env loader
//! - [`erased`], [`observer`], [`phase`]: dynamically typed surface for view
//!   layers

pub mod client;
pub mod config;
pub mod erased;
pub mod error;
pub mod fetcher;
pub mod gc;
pub mod inflight;
pub mod observer;
pub mod phase;
pub mod record;
pub mod store;

pub use client::QueryClient;
pub use config::{QueryConfig, QueryConfigBuilder, QuerySettings};
pub use erased::{AnyQueryClient, AnyRecord, NoopQueryClient, QueryClientAdapter};
pub use error::{QueryError, QueryResult};
pub use fetcher::{FnFetcher, QueryFetcher};
pub use freshet_common::resilience::{BackoffStrategy, RetryPolicy};
pub use observer::{ObservedUpdates, QueryObserver};
pub use phase::{QueryPhase, QueryState};
pub use record::{QueryData, QueryKey, QueryStatus, Record};
pub use store::{QueryStore, Subscription};
