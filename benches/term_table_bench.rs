//! Criterion benchmarks for sealed term table lookups.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use sigil::prelude::*;
use std::hint::black_box;

fn build_table(term_count: u64) -> TermTable {
    let mut table = TermTable::new();
    let mut next_index = 0u32;

    for hash in 0..term_count {
        table.open_term().unwrap();
        for _ in 0..3 {
            table.add_row_id(RowId::new(0, next_index)).unwrap();
            next_index += 1;
        }
        table.close_term(hash.wrapping_mul(0x9E37_79B9_7F4A_7C15)).unwrap();
    }

    table.open_term().unwrap();
    for _ in 0..3 {
        table.add_row_id(RowId::new(0, 0)).unwrap();
    }
    table.close_adhoc_term(30, 1).unwrap();

    table.set_row_counts(0, u64::from(next_index), 64).unwrap();
    table.seal().unwrap();
    table
}

fn bench_lookups(c: &mut Criterion) {
    let table = build_table(100_000);
    let explicit = Term::new(42u64.wrapping_mul(0x9E37_79B9_7F4A_7C15), 20, 1);
    let adhoc = Term::new(0xDECAF, 30, 1);

    let mut group = c.benchmark_group("term_table");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_rows_explicit", |b| {
        b.iter(|| table.get_rows(black_box(&explicit)).unwrap())
    });

    group.bench_function("get_rows_adhoc_fallback", |b| {
        b.iter(|| table.get_rows(black_box(&adhoc)).unwrap())
    });

    let sequence = table.get_rows(&adhoc).unwrap();
    group.bench_function("get_row_id_adhoc", |b| {
        b.iter(|| {
            table
                .get_row_id_adhoc(black_box(0xDECAF), sequence.start() as usize, black_box(1))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let table = build_table(10_000);
    let mut bytes = Vec::new();
    table.write(&mut bytes).unwrap();

    let mut group = c.benchmark_group("term_table_serial");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("write", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(bytes.len());
            table.write(&mut buf).unwrap();
            buf
        })
    });

    group.bench_function("read", |b| {
        b.iter(|| TermTable::read(&mut black_box(bytes.as_slice())).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_lookups, bench_serialization);
criterion_main!(benches);
