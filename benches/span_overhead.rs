//! Measurement overhead benchmarks.
//!
//! The scoped API sits on request hot paths, so opening and closing a span
//! must stay constant-time bookkeeping; the only linear work allowed is the
//! final breakdown computation.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use reqspan_lib::{begin, end, measure, Breakdown, RequestId};

/// Open/close with no bound context: the silent no-op path.
fn bench_noop_scope(c: &mut Criterion) {
    let mut group = c.benchmark_group("noop_scope");
    group.throughput(Throughput::Elements(1));
    group.bench_function("open_close_without_context", |b| {
        b.iter(|| {
            let _span = measure::scope(black_box("stage"));
        });
    });
    group.finish();
}

/// Full request cycle: begin, one measured stage, end.
fn bench_request_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_cycle");
    group.throughput(Throughput::Elements(1));
    group.bench_function("begin_measure_end", |b| {
        b.iter(|| {
            let handle = begin(RequestId::generate()).unwrap();
            {
                let _span = measure::scope(black_box("query_transform"));
            }
            black_box(end(handle).unwrap())
        });
    });
    group.finish();
}

/// Breakdown computation over a span-heavy trace.
fn bench_breakdown(c: &mut Criterion) {
    let handle = begin(RequestId::generate()).unwrap();
    for i in 0..1_000 {
        let _span = measure::scope(format!("stage_{}", i % 10));
    }
    let trace = end(handle).unwrap();

    let mut group = c.benchmark_group("breakdown");
    group.throughput(Throughput::Elements(trace.span_count() as u64));
    group.bench_function("compute_1k_spans", |b| {
        b.iter(|| Breakdown::compute(black_box(&trace)));
    });
    group.finish();
}

criterion_group!(benches, bench_noop_scope, bench_request_cycle, bench_breakdown);
criterion_main!(benches);
