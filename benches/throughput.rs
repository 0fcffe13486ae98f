use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dropwire::{
    Client, Delivery, MemoryTransport, SegmentMatcher, SessionConfig, TopicMatcher,
    TrailingWildcardMatcher,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const TOPIC: &str = "ai/design/ideas/generated";

fn topic_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_matching");

    let exact = SegmentMatcher.compile(TOPIC).unwrap();
    let wildcard = SegmentMatcher.compile("ai/*/ideas/*").unwrap();
    let trailing = TrailingWildcardMatcher.compile("ai/>").unwrap();

    group.bench_function("exact", |b| {
        b.iter(|| SegmentMatcher.matches(black_box(&exact), black_box(TOPIC)))
    });
    group.bench_function("single_level", |b| {
        b.iter(|| SegmentMatcher.matches(black_box(&wildcard), black_box(TOPIC)))
    });
    group.bench_function("trailing", |b| {
        b.iter(|| TrailingWildcardMatcher.matches(black_box(&trailing), black_box(TOPIC)))
    });
    group.finish();
}

fn publish_to_callbacks(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_dispatch");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(5));

    let runtime = Runtime::new().unwrap();

    for filters in [1usize, 16, 128].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(filters), filters, |b, &filters| {
            let delivered = Arc::new(AtomicU64::new(0));
            let client = runtime.block_on(async {
                let client = Client::new(SessionConfig::default(), MemoryTransport::new()).unwrap();
                client.connect().await.unwrap();
                // Only the last filter matches; the rest are scanned and skipped.
                for i in 0..filters - 1 {
                    client
                        .subscribe(&format!("bench/{i}/*"), |_: &Delivery<'_>| {})
                        .await
                        .unwrap();
                }
                let counter = delivered.clone();
                client
                    .subscribe("ai/*/ideas/generated", move |_: &Delivery<'_>| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                    .await
                    .unwrap();
                client
            });

            let payload = json!({
                "requestId": "req-bench",
                "ideas": [{"slug": "x", "slogan": "Ship It", "style": "bold"}]
            });

            b.iter(|| {
                runtime.block_on(async {
                    let target = delivered.load(Ordering::Relaxed) + 1;
                    client.publish(TOPIC, black_box(&payload)).await.unwrap();
                    while delivered.load(Ordering::Relaxed) < target {
                        tokio::task::yield_now().await;
                    }
                })
            });

            runtime.block_on(client.disconnect()).unwrap();
        });
    }
    group.finish();
}

criterion_group!(benches, topic_matching, publish_to_callbacks);
criterion_main!(benches);
