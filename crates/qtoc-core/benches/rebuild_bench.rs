//! Benchmarks for index rebuilds and query filtering.
//!
//! Run with: `cargo bench --package qtoc-core --bench rebuild_bench`
//!
//! A rebuild runs on every settled mutation burst, so it has to stay well
//! inside a frame even for long conversations. Filtering runs per keystroke
//! (after the input debounce) over every row.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use qtoc_core::fuzzy::{matches, render};
use qtoc_core::headless::HeadlessDocument;
use qtoc_core::{EntryIndex, TocConfig};

const QUESTIONS: &[&str] = &[
    "Explain recursion in Python. Show a small example.",
    "How do I sort a list of tuples by the second element?",
    "What is the difference between a process and a thread?",
    "Why does my borrow checker complain about this closure?",
    "Can you rewrite this SQL query to avoid the subselect?",
];

fn transcript(turns: usize) -> HeadlessDocument {
    let (mut doc, main) = HeadlessDocument::with_scroller(900.0);
    for i in 0..turns {
        let top = i as f64 * 240.0;
        let text = format!("{} (turn {i})", QUESTIONS[i % QUESTIONS.len()]);
        doc.append_turn(main, "user", &text, top, 120.0);
        doc.append_turn(main, "assistant", "Sure. Here is an answer.", top + 120.0, 120.0);
    }
    doc
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild");
    let Ok(selectors) = TocConfig::default().compile() else {
        return;
    };
    for turns in [50, 200, 800] {
        let doc = transcript(turns);
        group.throughput(Throughput::Elements(turns as u64));
        group.bench_with_input(BenchmarkId::new("turns", turns), &doc, |b, doc| {
            let mut index = EntryIndex::new();
            b.iter(|| black_box(index.rebuild_from(black_box(doc), &selectors).len()));
        });
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let corpus: Vec<String> = (0..1000)
        .map(|i| format!("{}. {}", i + 1, QUESTIONS[i % QUESTIONS.len()]))
        .collect();
    group.throughput(Throughput::Elements(corpus.len() as u64));
    for query in ["", "sql", "epn", "zzz"] {
        group.bench_with_input(BenchmarkId::new("matches", query), &query, |b, query| {
            b.iter(|| corpus.iter().filter(|t| matches(t, black_box(query))).count());
        });
        group.bench_with_input(BenchmarkId::new("render", query), &query, |b, query| {
            b.iter(|| {
                corpus
                    .iter()
                    .map(|t| render(t, black_box(query)).len())
                    .sum::<usize>()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rebuild, bench_filter);
criterion_main!(benches);
