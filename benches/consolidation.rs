//! Performance benchmarks for duplicate detection and consolidation.

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use continuity::consolidation::ConsolidationEngine;
use continuity::memory::MemoryManager;
use continuity::state::StateManager;
use continuity::store::Storage;
use continuity::{Classification, Importance, MemoryRecord};

fn record(content: &str) -> MemoryRecord {
    let now = Utc::now();
    MemoryRecord {
        id: String::new(),
        namespace: "default".into(),
        content: content.to_string(),
        summary: "benchmark".into(),
        classification: Classification::Reference,
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

fn setup(count: usize) -> (Arc<Storage>, Arc<StateManager>, ConsolidationEngine) {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let state_manager = Arc::new(StateManager::new(storage.clone(), Default::default()));
    let manager = MemoryManager::new(storage.clone(), state_manager.clone(), 100_000);

    for i in 0..count {
        manager.store(record(&format!("Recurring note about weekly status report number {i}"))).unwrap();
    }

    let engine = ConsolidationEngine::new(storage.clone(), state_manager.clone(), 0.7);
    (storage, state_manager, engine)
}

fn bench_detect(c: &mut Criterion) {
    let (_storage, _state_manager, engine) = setup(500);

    let mut group = c.benchmark_group("consolidation_detect");
    for count in [50, 200, 500].iter() {
        let (_storage, _state_manager, engine) = setup(*count);
        group.bench_with_input(BenchmarkId::new("pool_size", count), count, |b, _| {
            b.iter(|| engine.detect(black_box("Recurring note about weekly status report number 1"), "default", None).unwrap())
        });
    }
    group.finish();
}

fn bench_consolidate_and_rollback(c: &mut Criterion) {
    c.bench_function("consolidate_then_rollback", |b| {
        b.iter(|| {
            let storage = Arc::new(Storage::open_in_memory().unwrap());
            let state_manager = Arc::new(StateManager::new(storage.clone(), Default::default()));
            let manager = MemoryManager::new(storage.clone(), state_manager.clone(), 100_000);
            let engine = ConsolidationEngine::new(storage, state_manager, 0.7);

            let primary = manager.store(record("Favorite editor is a modal terminal editor")).unwrap();
            let duplicate = manager.store(record("Favorite editor is a modal terminal editor")).unwrap();

            let result = engine.consolidate(&primary, std::slice::from_ref(&duplicate)).unwrap();
            engine.rollback(&primary, &result.rollback_token).unwrap()
        })
    });
}

criterion_group!(benches, bench_detect, bench_consolidate_and_rollback);
criterion_main!(benches);
