use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use lazyrow::{Client, Key, NoopPageCache, Record, RecordMeta, SuperColumn};
use lazyrow_store::{ColumnPath, ConsistencyLevel, MemoryStorage, Storage};

const KS: &str = "bench";

fn client() -> Client<MemoryStorage> {
    Client::new(MemoryStorage::new()).with_cache(Arc::new(NoopPageCache))
}

fn seed_super_columns(client: &Client<MemoryStorage>, row: &str, n: usize) {
    for i in 0..n {
        let path = ColumnPath::new("prefs")
            .with_super_column(format!("sc{i:06}"))
            .with_column("n");
        client
            .storage()
            .insert(KS, row, &path, b"value", 1, ConsistencyLevel::One)
            .unwrap();
    }
}

// ── Record ──────────────────────────────────────────────────

fn bench_set_and_marshal(c: &mut Criterion) {
    let mut group = c.benchmark_group("record/set_marshal");
    let client = client();
    let meta = RecordMeta::builder(KS, "users").build();
    for n in [10, 100] {
        let names: Vec<String> = (0..n).map(|i| format!("col{i:04}")).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter_batched(
                || Record::new(client.clone(), Arc::clone(&meta)),
                |mut record| {
                    for name in &names {
                        record.set(name, "value").unwrap();
                    }
                    record.marshal()
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("record/save");
    let client = client();
    let meta = RecordMeta::builder(KS, "users").build();
    for n in [10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut i = 0u64;
            b.iter_batched(
                || {
                    i += 1;
                    let mut record = Record::new(client.clone(), Arc::clone(&meta));
                    record.set_key(&format!("row{i}"), None).unwrap();
                    for j in 0..n {
                        record.set(&format!("col{j:04}"), "value").unwrap();
                    }
                    record
                },
                |mut record| {
                    record.save(None).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// ── SuperColumn ─────────────────────────────────────────────

fn bench_enumerate(c: &mut Criterion) {
    let mut group = c.benchmark_group("supercolumn/enumerate");
    for n in [100, 1_000] {
        let client = client();
        seed_super_columns(&client, "row", n);
        let key = Key::row(KS, "prefs", "row").unwrap();
        let meta = RecordMeta::builder(KS, "prefs").build();
        for chunk in [10, 100] {
            group.bench_with_input(BenchmarkId::new(format!("chunk{chunk}"), n), &n, |b, _| {
                b.iter(|| {
                    let mut sc = SuperColumn::new(client.clone(), &key, Arc::clone(&meta)).chunk_size(chunk);
                    sc.children("", None).count()
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_set_and_marshal, bench_save, bench_enumerate);
criterion_main!(benches);
