//! Performance benchmarks for the search router's strategies.

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use continuity::memory::MemoryManager;
use continuity::search::{SearchQuery, SearchRouter};
use continuity::state::StateManager;
use continuity::store::Storage;
use continuity::{Classification, Importance, MemoryRecord};

const SAMPLE_CONTENTS: [&str; 10] = [
    "Authentication using JWT tokens and refresh mechanism",
    "Database migration strategy for PostgreSQL",
    "React component lifecycle and hooks optimization",
    "API rate limiting implementation with Redis",
    "Docker container orchestration with Kubernetes",
    "GraphQL schema design best practices",
    "Microservices communication patterns",
    "CI/CD pipeline configuration with GitHub Actions",
    "Memory leak detection in Node.js applications",
    "Rust ownership and borrowing concepts",
];

const IMPORTANCE_TIERS: [Importance; 4] = [Importance::Low, Importance::Medium, Importance::High, Importance::Critical];

fn setup_router(count: usize) -> (SearchRouter, Arc<Storage>) {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let state_manager = Arc::new(StateManager::new(storage.clone(), Default::default()));
    let manager = MemoryManager::new(storage.clone(), state_manager, 100_000);

    for i in 0..count {
        let now = Utc::now();
        let record = MemoryRecord {
            id: String::new(),
            namespace: "default".into(),
            content: format!("{} - variation {i} with additional context about software development", SAMPLE_CONTENTS[i % SAMPLE_CONTENTS.len()]),
            summary: "benchmark".into(),
            classification: Classification::Reference,
            importance: IMPORTANCE_TIERS[i % IMPORTANCE_TIERS.len()],
            topic: Some(format!("topic{}", i % 5)),
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
        };
        manager.store(record).unwrap();
    }

    (SearchRouter::new(storage.clone()), storage)
}

fn bench_fts_search(c: &mut Criterion) {
    let (router, _storage) = setup_router(1000);

    let mut group = c.benchmark_group("fts_search");
    let queries = ["authentication", "database migration", "React hooks optimization", "API rate limiting Redis"];

    for query in queries {
        group.bench_with_input(BenchmarkId::new("query", query), &query, |b, query| {
            b.iter(|| {
                let search_query = SearchQuery { text: query.to_string(), namespace: "default".into(), limit: 10, ..Default::default() };
                router.search(black_box(&search_query)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_recency_search(c: &mut Criterion) {
    let (router, _storage) = setup_router(500);

    c.bench_function("recency_search_empty_query", |b| {
        b.iter(|| {
            let search_query = SearchQuery { text: String::new(), namespace: "default".into(), limit: 10, ..Default::default() };
            router.search(black_box(&search_query)).unwrap()
        })
    });
}

criterion_group!(benches, bench_fts_search, bench_recency_search);
criterion_main!(benches);
