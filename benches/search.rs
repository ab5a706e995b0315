//! Benchmarks for full-text search.
//!
//! Benchmark targets:
//! - 100 documents: <20ms
//! - 1,000 documents: <50ms
//! - 10,000 documents: <100ms

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::print_stderr)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use wikigraph::models::{DocType, SearchOptions};
use wikigraph::Store;

fn seed_documents(store: &Store, count: usize) {
    for i in 0..count {
        store
            .save_document(
                &format!("Document {i}: Event-Driven Architecture Notes"),
                &format!("## Overview\n\nLearn about event-driven programming patterns in document {i}."),
                Some("bench"),
                &[],
                None,
                DocType::User,
            )
            .expect("seed document");
    }
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_documents");
    for &count in &[100usize, 1_000, 10_000] {
        let store = Store::open_in_memory().expect("open store");
        seed_documents(&store, count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                store
                    .search_documents("event-driven", &SearchOptions::default_user_scoped())
                    .expect("search")
            });
        });
    }
    group.finish();
}

fn bench_wildcard(c: &mut Criterion) {
    let store = Store::open_in_memory().expect("open store");
    seed_documents(&store, 1_000);

    c.bench_function("search_wildcard_1000", |b| {
        b.iter(|| {
            store
                .search_documents("*", &SearchOptions::default_user_scoped())
                .expect("search")
        });
    });
}

criterion_group!(benches, bench_search, bench_wildcard);
criterion_main!(benches);
