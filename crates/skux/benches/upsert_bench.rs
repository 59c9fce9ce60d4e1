/// Benchmarks for the hot path: row normalization and batched upserts
/// against the in-memory collection.
///
/// Run with: cargo bench --bench upsert_bench
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

use skux::{InMemoryCollection, ProductRecord, RawRow, normalize_at, upsert_all};

fn sample_rows(count: usize) -> Vec<RawRow> {
    (0..count)
        .map(|i| {
            let serde_json::Value::Object(row) = json!({
                "product_id": format!(" SKU-{i:06} "),
                "name": format!("Widget {i}"),
                "brand": "Acme",
                "category": "Tools",
                "price": format!("{}.99", i % 500),
                "currency": if i % 7 == 0 { "" } else { "EUR" },
                "stock": format!("{}.0", i % 40),
            }) else {
                unreachable!("json! object literal")
            };
            row
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let rows = sample_rows(1_000);
    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("1k_rows", |b| {
        b.iter(|| {
            rows.iter()
                .map(|row| normalize_at(black_box(row), 1_700_000_000))
                .collect::<Vec<ProductRecord>>()
        })
    });
    group.finish();
}

fn bench_upsert(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let records: Vec<ProductRecord> = sample_rows(5_000)
        .iter()
        .map(|row| normalize_at(row, 1_700_000_000))
        .collect();

    let mut group = c.benchmark_group("upsert_all");
    group.throughput(Throughput::Elements(records.len() as u64));
    for batch_size in [10_usize, 100, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.to_async(&rt).iter(|| async {
                    let mut collection = InMemoryCollection::new();
                    upsert_all(records.clone(), &mut collection, batch_size)
                        .await
                        .expect("in-memory upsert")
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_upsert);
criterion_main!(benches);
