//! Benchmarks for rollup aggregation performance

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rollup::{
    AggregatedRecord, AggregationEngine, AggregationState, AggregationStateCodec, FanoutRouter,
    HistoryRepository, Measurement, MemoryKeyValueStore, MemoryTimeSeries, PartitionedEngine,
    RollupConfig, SensorRegistry, StateCodec, TimeSeriesStore,
};

fn generate_test_data(count: usize, sensors: usize) -> Vec<Measurement> {
    (0..count)
        .map(|i| {
            let value = 200.0 + (i as f64 % 10.0) * 1.5;
            Measurement::new(format!("dev{}", i % sensors), i as i64, value)
        })
        .collect()
}

fn router(sensors: usize, rooms: usize) -> FanoutRouter {
    let mut registry = SensorRegistry::new();
    for i in 0..sensors {
        registry.add_edge(&format!("dev{}", i), &format!("room{}", i % rooms));
    }
    FanoutRouter::new(Arc::new(registry))
}

fn full_state() -> AggregationState {
    generate_test_data(50, 1)
        .iter()
        .fold(AggregationState::new(), |s, m| s.update(m))
}

fn bench_state_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("state");

    let data = generate_test_data(1000, 1);
    group.throughput(Throughput::Elements(1000));

    group.bench_function("update_1000", |b| {
        b.iter(|| {
            let state = data
                .iter()
                .fold(AggregationState::new(), |s, m| s.update(m));
            black_box(state);
        })
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let codec = AggregationStateCodec::new();
    let state = full_state();
    let bytes = codec.encode(&state);

    group.bench_function("encode_full_fifo", |b| {
        b.iter(|| black_box(codec.encode(black_box(&state))))
    });

    group.bench_function("decode_full_fifo", |b| {
        b.iter(|| black_box(codec.decode(black_box(&bytes))))
    });

    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    let data = generate_test_data(1000, 100);
    group.throughput(Throughput::Elements(1000));

    group.bench_function("process_1000", |b| {
        b.iter(|| {
            let mut engine = AggregationEngine::new(
                router(100, 10),
                MemoryKeyValueStore::new(),
                Vec::<AggregatedRecord>::with_capacity(1000),
            );
            for m in &data {
                black_box(engine.process(m).ok());
            }
        })
    });

    group.finish();
}

fn bench_partitioned(c: &mut Criterion) {
    let mut group = c.benchmark_group("partitioned");

    let data = generate_test_data(10_000, 1000);
    group.throughput(Throughput::Elements(10_000));

    for partitions in [1usize, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(partitions),
            &partitions,
            |b, &partitions| {
                b.iter(|| {
                    let mut engine = PartitionedEngine::new(
                        router(1000, 64),
                        RollupConfig::with_partitions(partitions),
                        |_| (MemoryKeyValueStore::new(), Vec::<AggregatedRecord>::new()),
                    );
                    black_box(engine.process_batch(&data).ok());
                })
            },
        );
    }

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    let mut series = MemoryTimeSeries::new();
    for m in generate_test_data(10_000, 1) {
        series.append(m).ok();
    }
    let repository = HistoryRepository::new(series);

    group.bench_function("distribution_10000_20_buckets", |b| {
        b.iter(|| black_box(repository.get_distribution("dev0", 0, 20)))
    });

    group.bench_function("trend_10000", |b| {
        b.iter(|| black_box(repository.trend("dev0", 0)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_state_update,
    bench_codec,
    bench_engine,
    bench_partitioned,
    bench_history,
);
criterion_main!(benches);
