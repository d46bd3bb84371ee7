//! Benchmarks for the metric log
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use process_metrics::storage::codec::{decode, encode};
use process_metrics::storage::*;
use serde_json::json;
use tempfile::tempdir;

fn create_test_records(count: usize) -> Vec<MetricRecord> {
    (0..count)
        .map(|i| {
            MetricRecord::flow_node(
                Utc::now(),
                "corr-bench",
                "pi-bench",
                "Bench",
                format!("fni-{}", i),
                "Task_1",
                MeasurementPoint::FlowNodeExited,
                json!({"iteration": i, "items": ["a", "b", "c"]}),
            )
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [100, 1000] {
        let records = create_test_records(size);
        let lines: Vec<String> = records.iter().map(|r| encode(r).unwrap()).collect();

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("encode_{}", size), |b| {
            b.iter(|| {
                for record in &records {
                    black_box(encode(black_box(record)).unwrap());
                }
            })
        });

        group.bench_function(format!("decode_{}", size), |b| {
            b.iter(|| {
                for line in &lines {
                    black_box(decode(black_box(line)).unwrap());
                }
            })
        });
    }

    group.bench_function("decode_v1_with_error", |b| {
        let line = "FlowNodeInstance;2019-05-03T09:12:00.000Z;corr;Bench;fni;Task_1;onFlowNodeError;{};%7B%22name%22%3A%22Error%22%2C%22message%22%3A%22boom%22%7D";
        b.iter(|| decode(black_box(line)).unwrap())
    });

    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("engine");

    group.bench_function("append_single", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let engine = MetricLogEngine::new(MetricLogConfig::new(dir.path()));
                let record = create_test_records(1).remove(0);

                let start = std::time::Instant::now();

                for _ in 0..iters {
                    engine.append(black_box(&record)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.bench_function("read_all_1000", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let engine = MetricLogEngine::new(MetricLogConfig::new(dir.path()));
                for record in create_test_records(1000) {
                    engine.append(&record).await.unwrap();
                }

                let start = std::time::Instant::now();

                for _ in 0..iters {
                    let _ = engine.read_all(black_box("Bench")).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_engine);
criterion_main!(benches);
