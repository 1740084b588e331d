//! Integration tests for the type-erased client surface and observers

mod support;

use std::sync::Arc;
use std::time::Duration;

use freshet_common::time::MockClock;
use freshet_core::{
    AnyQueryClient, NoopQueryClient, QueryClient, QueryConfig, QueryError, QueryObserver,
    QueryPhase, QueryStatus,
};
use futures::StreamExt;
use support::{client_with, ScriptedFetcher};

/// Verifies the adapter forwards every operation for keys of its type.
///
/// # Test Steps
/// 1. Erase a `&'static str` → `String` client
/// 2. Retain, ensure and read through the erased surface
/// 3. Decode the payload as `String`
#[tokio::test]
async fn test_adapter_forwards_matching_keys() {
    let fetcher = ScriptedFetcher::new();
    let client = client_with(QueryConfig::default(), &fetcher, &MockClock::new());
    let erased = client.erase();
    let key: &'static str = "profile";

    erased.retain_any(&key);
    erased.ensure_query_any(&key).await;

    let record = erased.read_any(&key).expect("record exists");
    assert_eq!(record.status, QueryStatus::Success);
    assert!(matches!(record.decode::<String>(), QueryPhase::Success(ref v) if v == "profile-v1"));
    assert_eq!(client.read(&"profile").map(|r| r.observers), Some(1));

    erased.release_any(&key);
    assert_eq!(client.read(&"profile").map(|r| r.observers), Some(0));
}

/// Verifies keys of the wrong type are treated as unknown.
#[tokio::test]
async fn test_adapter_ignores_foreign_keys() {
    let fetcher = ScriptedFetcher::new();
    let client = client_with(QueryConfig::default(), &fetcher, &MockClock::new());
    let erased = client.erase();
    let wrong_key = 42u64;

    erased.retain_any(&wrong_key);
    erased.ensure_query_any(&wrong_key).await;
    erased.release_any(&wrong_key);

    assert!(erased.read_any(&wrong_key).is_none());
    assert!(erased.subscribe_any(&wrong_key).next().await.is_none());
    assert_eq!(fetcher.calls(), 0);
}

/// Verifies decoding as the wrong payload type is a typed error.
#[tokio::test]
async fn test_decode_mismatch_is_error_phase() {
    let fetcher = ScriptedFetcher::new();
    let client = client_with(QueryConfig::default(), &fetcher, &MockClock::new());
    let erased = client.erase();
    let key: &'static str = "k";

    erased.ensure_query_any(&key).await;
    let record = erased.read_any(&key).expect("record exists");

    match record.decode::<u64>() {
        QueryPhase::Error(QueryError::TypeMismatch { expected }) => assert_eq!(expected, "u64"),
        other => panic!("expected a type mismatch, got {other:?}"),
    }
}

/// Verifies heterogeneous clients behind one interface.
#[tokio::test]
async fn test_heterogeneous_clients() {
    let strings = client_with(QueryConfig::default(), &ScriptedFetcher::new(), &MockClock::new());
    let numbers: QueryClient<u32, u64> =
        QueryClient::from_fn(QueryConfig::default(), |n: u32| async move {
            Ok::<_, std::io::Error>(u64::from(n) * 10)
        })
        .expect("client builds");

    let clients: Vec<Arc<dyn AnyQueryClient>> =
        vec![strings.erase(), numbers.erase(), Arc::new(NoopQueryClient)];

    let number_key = 4u32;
    for client in &clients {
        client.ensure_query_any(&number_key).await;
    }

    let hits: Vec<_> = clients.iter().filter_map(|c| c.read_any(&number_key)).collect();
    assert_eq!(hits.len(), 1);
    assert!(matches!(hits[0].decode::<u64>(), QueryPhase::Success(40)));
}

/// Verifies an observer stream starts a fetch and follows updates.
///
/// # Test Steps
/// 1. Observe a never-fetched key through its update stream
/// 2. Assert the stream shows loading then the fetched value
/// 3. Drop the stream and assert the key is released
#[tokio::test(start_paused = true)]
async fn test_observer_stream_lifecycle() {
    let fetcher = ScriptedFetcher::new().with_latency(Duration::from_millis(100));
    let client = client_with(QueryConfig::default(), &fetcher, &MockClock::new());

    let mut updates = client.observe("feed").into_updates();

    let first = updates.next().await.expect("initial state");
    assert!(first.is_idle() || first.is_loading());

    let mut last = first;
    while last.data().is_none() {
        last = updates.next().await.expect("stream continues while observed");
    }
    assert_eq!(last.data().map(String::as_str), Some("feed-v1"));
    assert_eq!(client.read(&"feed").map(|r| r.observers), Some(1));

    drop(updates);
    assert_eq!(client.read(&"feed").map(|r| r.observers), Some(0));
    assert_eq!(fetcher.calls(), 1);
}

/// Verifies a typed observer over an erased no-op client.
#[tokio::test]
async fn test_observer_on_noop_client() {
    let observer: QueryObserver<String> =
        QueryObserver::new(Arc::new(NoopQueryClient), "anything");
    observer.ensure().await;
    assert!(observer.state().is_idle());
}
