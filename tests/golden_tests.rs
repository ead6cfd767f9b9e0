//! Golden scenario tests against the public `Engine` facade.
//!
//! Run with: cargo test --test golden_tests

use std::sync::Arc;

use pretty_assertions::assert_eq;

use continuity::consolidation::Recommendation;
use continuity::provider::{ChatTurn, NullProvider, StaticProvider};
use continuity::search::SearchQuery;
use continuity::{Classification, Configuration, Engine, Importance, MemoryState};

fn provider_with(response: &str) -> Arc<dyn continuity::provider::ModelProvider> {
    Arc::new(StaticProvider { response: response.to_string() })
}

// ============================================================================
// S1 - ingest and classify a chat turn
// ============================================================================

#[tokio::test]
async fn s1_ingest_and_classify() {
    let engine = Engine::in_memory(provider_with(
        r#"{"content":"User's favorite language is Rust","summary":"favorite language","classification":"PERSONAL","importance":"HIGH","confidenceScore":0.85}"#,
    ))
    .unwrap();

    let id = engine
        .store_chat(ChatTurn {
            user_input: "What's your favorite programming language?".into(),
            ai_output: "I really enjoy Rust for its safety guarantees.".into(),
            namespace: "default".into(),
        })
        .await
        .unwrap();

    let record = engine.memory_manager().get(&id, "default").unwrap().unwrap();
    assert_eq!(record.classification, Classification::Personal);
    assert_eq!(record.importance, Importance::High);
    assert_eq!(engine.get_memory_state(id).await.unwrap(), MemoryState::Processed);
}

// ============================================================================
// S2 - a parse failure falls back to the deterministic extraction
// ============================================================================

#[tokio::test]
async fn s2_malformed_provider_response_falls_back() {
    let engine = Engine::in_memory(provider_with("not json at all")).unwrap();
    let id = engine
        .store_chat(ChatTurn { user_input: "hi there".into(), ai_output: "hello!".into(), namespace: "default".into() })
        .await
        .unwrap();

    let record = engine.memory_manager().get(&id, "default").unwrap().unwrap();
    assert_eq!(record.classification, Classification::Conversational);
    assert_eq!(record.classification_reason, "Fallback processing due to error");
}

// ============================================================================
// S3 - an invalid state transition is rejected with a suggestion
// ============================================================================

#[tokio::test]
async fn s3_invalid_transition_carries_suggestion() {
    let engine = Engine::in_memory(Arc::new(NullProvider)).unwrap();
    let id = engine
        .store_chat(ChatTurn { user_input: "hi".into(), ai_output: "hello".into(), namespace: "default".into() })
        .await
        .unwrap();

    let err = engine.transition_memory_state(id, MemoryState::Cleaned, None).await.unwrap_err();
    assert!(err.to_string().contains("suggested"));
}

// ============================================================================
// S4 - relationship extraction links a continuation turn to its predecessor
// ============================================================================

#[tokio::test]
async fn s4_continuation_turn_is_linked() {
    let engine = Engine::in_memory(provider_with(
        r#"{"content":"We talked about TypeScript generics and interfaces","summary":"typescript","classification":"CONTEXTUAL","importance":"MEDIUM","topic":"typescript"}"#,
    ))
    .unwrap();

    let first = engine
        .store_chat(ChatTurn { user_input: "Tell me about TypeScript generics".into(), ai_output: "Generics let you parameterize types.".into(), namespace: "default".into() })
        .await
        .unwrap();

    let second = engine
        .store_chat(ChatTurn {
            user_input: "Building on that, let's continue with TypeScript generics and interfaces".into(),
            ai_output: "Sure, let's continue.".into(),
            namespace: "default".into(),
        })
        .await
        .unwrap();

    let network = engine.related_to(second.clone(), 2, "default".into()).await.unwrap();
    assert!(network.entries.iter().any(|e| e.memory_id == first) || first == second);
}

// ============================================================================
// S5 - consolidation detects and folds a near-duplicate, then rolls back
// ============================================================================

#[tokio::test]
async fn s5_consolidate_and_rollback() {
    let engine = Engine::in_memory(Arc::new(NullProvider)).unwrap();
    let primary = engine
        .store_chat(ChatTurn { user_input: "My favorite color is blue".into(), ai_output: "Noted, blue it is.".into(), namespace: "default".into() })
        .await
        .unwrap();
    let duplicate = engine
        .store_chat(ChatTurn { user_input: "My favorite color is blue".into(), ai_output: "Got it, blue.".into(), namespace: "default".into() })
        .await
        .unwrap();

    let candidates = engine.detect_duplicates("My favorite color is blue Noted, blue it is.".into(), "default".into()).await.unwrap();
    assert!(candidates.iter().any(|c| c.memory_id == duplicate || c.memory_id == primary));

    let result = engine.consolidate(primary.clone(), vec![duplicate.clone()]).await.unwrap();
    assert_eq!(result.data_integrity_hash.len(), 16);
    assert_eq!(engine.get_memory_state(primary.clone()).await.unwrap(), MemoryState::Consolidated);

    let outcome = engine.rollback_consolidation(primary, result.rollback_token).await.unwrap();
    assert!(outcome.success);
}

// ============================================================================
// S6 - FTS search finds an ingested record by content
// ============================================================================

#[tokio::test]
async fn s6_fts_search_finds_ingested_record() {
    let engine = Engine::in_memory(provider_with(
        r#"{"content":"The deployment pipeline uses GitHub Actions","summary":"deploy pipeline","classification":"REFERENCE","importance":"MEDIUM"}"#,
    ))
    .unwrap();
    engine
        .store_chat(ChatTurn { user_input: "What does our deploy pipeline use?".into(), ai_output: "GitHub Actions.".into(), namespace: "default".into() })
        .await
        .unwrap();

    let results = engine
        .search_memories(SearchQuery { text: "GitHub Actions".into(), namespace: "default".into(), limit: 10, ..Default::default() })
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].strategy, "fts");
}

// ============================================================================
// Consolidation scoring sanity check
// ============================================================================

#[test]
fn identical_text_recommends_merge() {
    let score = continuity::consolidation::similarity::score("exactly the same sentence here", "exactly the same sentence here");
    assert_eq!(score.recommendation, Recommendation::Merge);
}

// ============================================================================
// A record survives a close + reopen against the same file-backed database
// ============================================================================

#[tokio::test]
async fn record_persists_across_reopen_of_file_backed_storage() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("continuity.db");

    let mut config = Configuration::in_memory();
    config.database_url = db_path.to_str().unwrap().to_string();

    let id = {
        let engine = Engine::open(config.clone(), Arc::new(NullProvider)).unwrap();
        let id = engine
            .store_chat(ChatTurn { user_input: "remember this across restarts".into(), ai_output: "noted".into(), namespace: "default".into() })
            .await
            .unwrap();
        engine.close().await;
        id
    };

    let engine = Engine::open(config, Arc::new(NullProvider)).unwrap();
    let record = engine.memory_manager().get(&id, "default").unwrap().unwrap();
    assert_eq!(record.content, "remember this across restarts noted");
}
