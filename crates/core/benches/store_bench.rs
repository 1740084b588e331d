use std::time::{Duration, SystemTime};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use freshet_core::{QueryClient, QueryConfig, QueryStore, Record};
use futures::{FutureExt, StreamExt};
use tokio::runtime::Runtime;

fn bench_store_set_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_set_fan_out");
    let now = SystemTime::now();

    for subscribers in [0usize, 1, 16, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let store: QueryStore<u64, String> = QueryStore::new();
                let mut subscriptions: Vec<_> =
                    (0..subscribers).map(|_| store.subscribe(&1)).collect();

                b.iter(|| {
                    store.set(black_box(1), Record::success("payload".to_string(), now, 0));
                    for subscription in &mut subscriptions {
                        black_box(subscription.next().now_or_never());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_store_reads(c: &mut Criterion) {
    let store: QueryStore<u64, String> = QueryStore::new();
    let now = SystemTime::now();
    for key in 0..1_000 {
        store.set(key, Record::success(format!("value-{key}"), now, 0));
    }

    c.bench_function("store_get_hit", |b| b.iter(|| store.get(black_box(&500))));
    c.bench_function("store_retain_release", |b| {
        b.iter(|| {
            store.retain(black_box(&42));
            store.release(black_box(&42));
        });
    });
    c.bench_function("store_collect_stale_observed", |b| {
        b.iter(|| store.collect_stale_observed(black_box(now), Duration::from_secs(1)));
    });
}

fn bench_client_fresh_hit(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime builds");
    let client = rt.block_on(async {
        let client: QueryClient<u64, String> =
            QueryClient::from_fn(QueryConfig::default(), |key: u64| async move {
                Ok::<_, std::io::Error>(format!("value-{key}"))
            })
            .expect("client builds");
        client.ensure_query(&7).await;
        client
    });

    c.bench_function("client_ensure_fresh", |b| {
        b.to_async(&rt).iter(|| client.ensure_query(black_box(&7)));
    });
}

criterion_group!(benches, bench_store_set_fan_out, bench_store_reads, bench_client_fresh_hit);
criterion_main!(benches);
