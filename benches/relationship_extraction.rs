//! Performance benchmarks for deterministic relationship extraction.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use continuity::relationships::extraction::extract;
use continuity::{Classification, Importance, MemoryRecord};

fn record(id: &str, content: &str) -> MemoryRecord {
    let now = Utc::now();
    MemoryRecord {
        id: id.to_string(),
        namespace: "default".into(),
        content: content.to_string(),
        summary: "benchmark".into(),
        classification: Classification::Contextual,
        importance: Importance::Medium,
        topic: None,
        entities: vec![],
        keywords: vec![],
        confidence_score: 0.7,
        classification_reason: "benchmark".into(),
        created_at: now,
        updated_at: now,
        extraction_timestamp: now,
        relationships: vec![],
        supersedes: vec![],
        conscious_processed: false,
        consolidation: None,
    }
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("relationship_extraction");

    for window in [5, 25, 50].iter() {
        let candidates: Vec<_> = (0..*window)
            .map(|i| record(&format!("candidate-{i}"), &format!("We previously discussed deployment pipeline topic {i} in depth")))
            .collect();
        let new_record = record("new", "Building on our earlier discussion about the deployment pipeline and its rollout stages");

        group.bench_with_input(BenchmarkId::new("candidate_window", window), window, |b, _| {
            b.iter(|| extract(black_box(&new_record), black_box(&candidates)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
