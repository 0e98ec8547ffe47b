//! Performance benchmarks for tidemark-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tidemark_engine::scope::{Principal, Role};
use tidemark_engine::{PullRequest, PushBatch, SyncEvent, SyncHub, SyncSession};

const T0: &str = "2024-03-01T10:00:00Z";

fn seeded_hub(entries: u64) -> SyncHub {
    let mut hub = SyncHub::default();
    hub.create_tenant("acme");
    let principal = Principal::new("acme", "user-1", Role::Member);

    let mut pushed = 0;
    let mut batch_index = 0;
    while pushed < entries {
        let size = (entries - pushed).min(500);
        let events: Vec<_> = (0..size)
            .map(|i| {
                let n = pushed + i;
                SyncEvent::upsert(
                    format!("evt-{n}"),
                    "notes",
                    format!("note-{n}"),
                    json!({"title": "bench", "n": n}),
                    T0,
                )
            })
            .collect();
        hub.push(
            &principal,
            PushBatch {
                device_id: "device-1".into(),
                batch_id: format!("device-1:{batch_index}"),
                events,
            },
            T0,
        )
        .unwrap();
        pushed += size;
        batch_index += 1;
    }
    hub
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for batch_size in [10u64, 100, 500] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let mut hub = SyncHub::default();
                hub.create_tenant("acme");
                let principal = Principal::new("acme", "user-1", Role::Member);
                let mut n = 0u64;

                b.iter(|| {
                    n += 1;
                    let events: Vec<_> = (0..batch_size)
                        .map(|i| {
                            SyncEvent::upsert(
                                format!("evt-{n}-{i}"),
                                "notes",
                                format!("note-{n}-{i}"),
                                json!({"title": "bench"}),
                                T0,
                            )
                        })
                        .collect();
                    hub.push(
                        &principal,
                        PushBatch {
                            device_id: "device-1".into(),
                            batch_id: format!("device-1:{n}"),
                            events,
                        },
                        black_box(T0),
                    )
                    .unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull");

    let mut hub = seeded_hub(5_000);
    let principal = Principal::new("acme", "user-2", Role::Member);

    group.bench_function("pull_100_from_middle", |b| {
        let mut request = PullRequest::for_device("device-2");
        request.checkpoints.insert("default".into(), 2_500);
        b.iter(|| hub.pull(&principal, black_box(&request)).unwrap())
    });

    group.bench_function("pull_at_watermark", |b| {
        let mut request = PullRequest::for_device("device-2");
        request.checkpoints.insert("default".into(), 5_000);
        b.iter(|| hub.pull(&principal, black_box(&request)).unwrap())
    });

    group.finish();
}

fn bench_client_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_merge");

    let mut hub = seeded_hub(1_000);
    let principal = Principal::new("acme", "user-2", Role::Member);
    let mut request = PullRequest::for_device("device-2");
    request.checkpoints.insert("default".into(), 0);
    request.limit = Some(1_000);
    let bundle = hub.pull(&principal, &request).unwrap();

    group.bench_function("merge_1000_entries", |b| {
        b.iter(|| {
            let mut session = SyncSession::new("device-2");
            session.begin_pull().unwrap();
            session.complete_pull(black_box(&bundle)).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_pull, bench_client_merge);
criterion_main!(benches);
