//! Performance benchmarks for relationship-network traversal (BFS).

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use continuity::relationships::RelationshipEngine;
use continuity::store::Storage;
use continuity::types::{Relationship, RelationshipType};

fn store_record(storage: &Storage, id: &str) {
    storage
        .with_connection(|conn| {
            conn.execute(
                "INSERT INTO short_term_memory (
                    id, namespace, content, summary, classification, importance, topic,
                    entities, keywords, confidence_score, classification_reason,
                    created_at, updated_at, extraction_timestamp, relationships, supersedes,
                    conscious_processed, consolidation, state
                ) VALUES (?1,'default','content','summary','CONVERSATIONAL','MEDIUM',NULL,
                    '[]','[]',0.5,'benchmark',datetime('now'),datetime('now'),datetime('now'),
                    '[]','[]',0,NULL,'PROCESSED')",
                rusqlite::params![id],
            )
        })
        .unwrap();
}

fn build_graph(storage: &Storage, engine: &RelationshipEngine, branching_factor: usize, max_depth: usize) -> String {
    let root_id = "root".to_string();
    store_record(storage, &root_id);

    let mut current_level = vec![root_id.clone()];
    let mut counter = 0usize;

    for _ in 0..max_depth {
        let mut next_level = Vec::new();
        for parent in &current_level {
            let mut children = Vec::new();
            for _ in 0..branching_factor {
                counter += 1;
                let child_id = format!("node-{counter}");
                store_record(storage, &child_id);
                children.push(Relationship {
                    relationship_type: RelationshipType::Related,
                    target_memory_id: child_id.clone(),
                    confidence: 0.8,
                    strength: 0.6,
                    reason: "synthetic benchmark edge between generated nodes".into(),
                    context: "benchmark".into(),
                    entities: vec![],
                });
                next_level.push(child_id);
            }
            engine.store(parent, "default", children).unwrap();
        }
        current_level = next_level;
    }

    root_id
}

fn bench_traversal(c: &mut Criterion) {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let engine = RelationshipEngine::new(storage.clone(), 1000);
    // depth 3, branching factor 5 (~156 nodes)
    let root_id = build_graph(&storage, &engine, 5, 3);

    let mut group = c.benchmark_group("traversal");
    group.bench_function("bfs_depth_3", |b| {
        b.iter(|| engine.network(black_box(&root_id), 3, "default").unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_traversal);
criterion_main!(benches);
