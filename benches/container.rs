use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use ferrous_container::middleware::{CacheMiddleware, LoggingMiddleware, MetricsMiddleware, NoopCollector};
use ferrous_container::{Container, MemoStore, Resolver};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let rt = runtime();
    let container = Container::new();
    container.bind_instance("n", 42u64);
    rt.block_on(container.resolve::<u64>("n")).unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = rt.block_on(container.resolve::<u64>("n")).unwrap();
            black_box(v);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    let rt = runtime();
    c.bench_function("singleton_cold_expensive", |b| {
        b.iter_batched(
            || {
                let container = Container::new();
                container.bind_singleton("expensive", |_| async {
                    Ok(ExpensiveToCreate {
                        data: (0..1000).collect(),
                    })
                });
                container
            },
            |container| {
                let v = rt
                    .block_on(container.resolve::<ExpensiveToCreate>("expensive"))
                    .unwrap();
                black_box(v.data.len());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_transient_chain(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("transient_chain");

    for depth in [1u32, 4, 16] {
        let container = Container::new();
        for i in 0..depth {
            container.bind_transient(format!("n{i}"), move |r: Resolver| async move {
                r.resolve::<u32>(format!("n{}", i + 1)).await.map(|v| *v)
            });
        }
        container.bind_instance(format!("n{depth}"), depth);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &container, |b, container| {
            b.iter(|| black_box(rt.block_on(container.resolve::<u32>("n0")).unwrap()))
        });
    }
    group.finish();
}

fn bench_middleware_overhead(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("middleware_overhead");

    let bare = Container::new();
    bare.bind_transient("t", |_| async { Ok(7u64) });
    group.bench_function("none", |b| {
        b.iter(|| black_box(rt.block_on(bare.resolve::<u64>("t")).unwrap()))
    });

    let observed = Container::new();
    observed
        .use_middleware(LoggingMiddleware::new())
        .use_middleware(MetricsMiddleware::new(Arc::new(NoopCollector)))
        .bind_transient("t", |_| async { Ok(7u64) });
    group.bench_function("logging_and_metrics", |b| {
        b.iter(|| black_box(rt.block_on(observed.resolve::<u64>("t")).unwrap()))
    });

    let cached = Container::new();
    cached
        .use_middleware(CacheMiddleware::new())
        .bind_transient("t", |_| async { Ok(7u64) });
    group.bench_function("cache_hit", |b| {
        b.iter(|| black_box(rt.block_on(cached.resolve::<u64>("t")).unwrap()))
    });

    group.finish();
}

fn bench_memo_store(c: &mut Criterion) {
    let rt = runtime();
    let store: MemoStore<u64, u64> = MemoStore::new();
    rt.block_on(store.remember(1, Duration::ZERO, || async { Ok::<_, Infallible>(1) }))
        .unwrap();

    c.bench_function("memo_remember_hit", |b| {
        b.iter(|| {
            let v = rt
                .block_on(store.remember(1, Duration::ZERO, || async { Ok::<_, Infallible>(0) }))
                .unwrap();
            black_box(v);
        })
    });

    c.bench_function("memo_get_hit", |b| b.iter(|| black_box(store.get(&1))));
}

criterion_group!(
    benches,
    bench_singleton_hit,
    bench_singleton_cold,
    bench_transient_chain,
    bench_middleware_overhead,
    bench_memo_store
);
criterion_main!(benches);
