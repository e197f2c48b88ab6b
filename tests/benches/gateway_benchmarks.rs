//! # Query Gateway Benchmarks
//!
//! Per-mode dispatch overhead over the in-process bus:
//!
//! | Mode | Measured |
//! |------|----------|
//! | Point-to-point | build, intercept, dispatch and convert one result |
//! | Scatter-gather | fan-out to N handlers and collect |
//! | Interceptors | cost of a growing dispatch chain |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;
use query_gateway::{handler_fn, DefaultQueryGateway, SimpleQueryBus};
use serde_json::json;
use shared_messaging::{
    dispatch_interceptor_fn, HandlerFailure, MetaData, QueryError, QueryMessage, ResponseTypes,
    TypeShape,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn gateway_with_handlers(handlers: usize) -> DefaultQueryGateway {
    let bus = SimpleQueryBus::new();
    for i in 0..handlers {
        bus.subscribe(
            "count",
            Arc::new(handler_fn(TypeShape::of::<u64>(), move |_query: QueryMessage| async move {
                Ok::<_, HandlerFailure>(json!(i))
            })),
        );
    }
    DefaultQueryGateway::builder()
        .query_bus(Arc::new(bus))
        .build()
        .expect("gateway builds")
}

fn bench_point_to_point(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let gateway = gateway_with_handlers(1);

    let mut group = c.benchmark_group("point-to-point");
    group.bench_function("query_instance", |b| {
        b.to_async(&rt).iter(|| async {
            let value = gateway
                .query_named("count", &(), ResponseTypes::instance_of::<u64>())
                .await
                .expect("answered");
            black_box(value)
        })
    });
    group.finish();
}

fn bench_scatter_gather(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("scatter-gather");
    for handlers in [1usize, 8, 64] {
        let gateway = gateway_with_handlers(handlers);
        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(BenchmarkId::new("gather", handlers), &handlers, |b, _| {
            b.to_async(&rt).iter(|| async {
                let results: Vec<_> = gateway
                    .scatter_gather_named(
                        "count",
                        &(),
                        ResponseTypes::instance_of::<u64>(),
                        Duration::from_secs(1),
                    )
                    .collect()
                    .await;
                black_box(results)
            })
        });
    }
    group.finish();
}

fn bench_interceptor_chain(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("dispatch-interceptors");
    for depth in [0usize, 4, 16] {
        let gateway = gateway_with_handlers(1);
        let _registrations: Vec<_> = (0..depth)
            .map(|_| {
                gateway.register_dispatch_interceptor(Arc::new(dispatch_interceptor_fn(
                    |query: QueryMessage| async move {
                        Ok::<_, QueryError>(query.and_metadata(&MetaData::with("hop", "1")))
                    },
                )))
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, _| {
            b.to_async(&rt).iter(|| async {
                let value = gateway
                    .query_named("count", &(), ResponseTypes::instance_of::<u64>())
                    .await
                    .expect("answered");
                black_box(value)
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_point_to_point,
    bench_scatter_gather,
    bench_interceptor_chain
);
criterion_main!(benches);
