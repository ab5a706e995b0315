//! Benchmarks for topic clustering (C10): entity extraction plus
//! community detection over the IDF-weighted entity co-occurrence graph.
//!
//! Benchmark targets:
//! - 100 documents: community detection completes well under a second
//! - 1,000 documents: stays sub-linear enough for interactive `maintain wiki topics`

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::print_stderr)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use wikigraph::config::AppConfig;
use wikigraph::models::DocType;
use wikigraph::Store;

const TOPICS: &[&str] = &["Falcon Scheduler", "Quantum Flux", "Session Bug", "Harbor Gateway", "Nimbus Cache"];

fn seed_documents(store: &Store, count: usize) {
    for i in 0..count {
        let topic = TOPICS[i % TOPICS.len()];
        let content = format!(
            "## {topic} Overview\n\nThe `{topic}` system handles **core processing** for document {i}.\nRelated systems include {topic} Gateway and {topic} Cache."
        );
        let id = store
            .save_document(&format!("{topic} Notes {i}"), &content, None, &[], None, DocType::User)
            .expect("seed document");
        store.extract_and_save_entities_heuristic(id).expect("extract entities");
    }
}

fn bench_discover_topics(c: &mut Criterion) {
    let mut group = c.benchmark_group("discover_topics");
    for &count in &[100usize, 1_000] {
        let store = Store::open_in_memory().expect("open store");
        seed_documents(&store, count);
        let config = AppConfig::default().clustering;

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| store.discover_topics(None, &config).expect("discover topics"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_discover_topics);
criterion_main!(benches);
