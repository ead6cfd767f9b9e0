//! Orchestration Facade (§4.8, §5.1, component H): the async public surface.
//!
//! Every synchronous manager (A-G) is built on `Arc<Storage>` behind a
//! `parking_lot::Mutex`; this facade is the only place that crosses into
//! `tokio`, bridging each blocking call with `spawn_blocking` the same way
//! the teacher's `storage::meilisearch_indexer` bridges its blocking HTTP
//! client into async callers.

use std::sync::Arc;

use tracing::instrument;

use crate::config::Configuration;
use crate::consolidation::{scheduler, CleanupOutcome, Candidate, ConsolidationAnalytics, ConsolidationEngine, ConsolidationResult, RollbackOutcome};
use crate::error::{MemoryError, Result};
use crate::memory::{ListOptions, MemoryManager};
use crate::provider::{self, ChatTurn, ModelProvider};
use crate::relationships::{network::Network, QueryMatch, RelationshipEngine, RelationshipQuery, StoreOutcome};
use crate::search::{SearchQuery, SearchRouter};
use crate::state::{StateManager, StateMetrics};
use crate::store::{health, HealthProbe, Metrics, Storage};
use crate::types::{Classification, Importance, MemoryId, MemoryRecord, MemoryState, Relationship, StateTransition};

#[derive(Debug, serde::Serialize)]
pub struct EngineStats {
    pub state: StateMetrics,
    pub consolidation: ConsolidationAnalytics,
    pub query_metrics_count: usize,
}

/// Wires managers A-G behind one async API. Holds `Arc`s to each manager so
/// cloning the facade (e.g. into a scheduler task) is cheap.
pub struct Engine {
    storage: Arc<Storage>,
    state_manager: Arc<StateManager>,
    memory: Arc<MemoryManager>,
    relationships: Arc<RelationshipEngine>,
    search: Arc<SearchRouter>,
    index: Arc<crate::search::FtsIndexManager>,
    consolidation: Arc<ConsolidationEngine>,
    provider: Arc<dyn ModelProvider>,
    metrics: Arc<Metrics>,
    scheduler: parking_lot::Mutex<Option<scheduler::SchedulerHandle>>,
    config: Configuration,
}

impl Engine {
    pub fn open(config: Configuration, provider: Arc<dyn ModelProvider>) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config.database_url)?);
        let state_manager = Arc::new(StateManager::new(storage.clone(), config.state_manager.clone()));
        let memory = Arc::new(MemoryManager::new(storage.clone(), state_manager.clone(), config.max_content_length));
        let relationships = Arc::new(
            RelationshipEngine::new(storage.clone(), config.max_relationships_per_memory)
                .with_conflict_confidence_variance(config.consolidation.conflict_confidence_variance),
        );
        let search = Arc::new(SearchRouter::new(storage.clone()));
        let index = Arc::new(crate::search::FtsIndexManager::new(storage.clone()));
        let consolidation = Arc::new(ConsolidationEngine::new(storage.clone(), state_manager.clone(), config.consolidation.similarity_threshold));
        let metrics = Arc::new(Metrics::new(config.performance.clone()));

        Ok(Self {
            storage,
            state_manager,
            memory,
            relationships,
            search,
            index,
            consolidation,
            provider,
            metrics,
            scheduler: parking_lot::Mutex::new(None),
            config,
        })
    }

    pub fn in_memory(provider: Arc<dyn ModelProvider>) -> Result<Self> {
        Self::open(Configuration::in_memory(), provider)
    }

    /// Ingest one chat turn: ask the provider to classify/distill it, fall
    /// back to a deterministic record on any parse failure, store it, then
    /// extract relationships against recent namespace history.
    #[instrument(skip(self, turn))]
    pub async fn store_chat(&self, turn: ChatTurn) -> Result<MemoryId> {
        let started = std::time::Instant::now();
        // Namespace precedence: an explicit, non-empty turn namespace wins,
        // falling back to the engine's configured namespace and then the
        // "default" namespace (§9.1a).
        let namespace = if !turn.namespace.trim().is_empty() {
            turn.namespace.clone()
        } else if !self.config.namespace.trim().is_empty() {
            self.config.namespace.clone()
        } else {
            "default".to_string()
        };
        let turn = ChatTurn { namespace: namespace.clone(), ..turn };

        let extracted = match self.provider.chat_completion(&turn).await {
            Ok(raw) => provider::parse_response(&raw).unwrap_or_else(|_| provider::fallback_extraction(&turn)),
            Err(_) => provider::fallback_extraction(&turn),
        };

        let record = MemoryRecord {
            id: String::new(),
            namespace,
            content: extracted.content,
            summary: extracted.summary,
            classification: extracted.classification.parse().unwrap_or(Classification::Conversational),
            importance: extracted.importance.parse().unwrap_or(Importance::Medium),
            topic: extracted.topic,
            entities: extracted.entities,
            keywords: extracted.keywords,
            confidence_score: extracted.confidence_score,
            classification_reason: extracted.classification_reason,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            extraction_timestamp: chrono::Utc::now(),
            relationships: vec![],
            supersedes: vec![],
            conscious_processed: false,
            consolidation: None,
        };

        let memory = self.memory.clone();
        let relationships = self.relationships.clone();
        let namespace = turn.namespace.clone();
        let enable_relationship_extraction = self.config.enable_relationship_extraction;
        let id = tokio::task::spawn_blocking(move || -> Result<MemoryId> {
            let id = memory.store(record)?;
            if enable_relationship_extraction {
                let recent = memory.list_by_namespace(&namespace, ListOptions { limit: 50, offset: 0, order_by_created_at_asc: false })?;
                let stored = memory.get(&id, &namespace)?.ok_or_else(|| MemoryError::NotFound(id.clone()))?;
                let found = crate::relationships::extraction::extract(&stored, &recent);
                if !found.is_empty() {
                    relationships.store(&id, &namespace, found)?;
                }
            }
            Ok(id)
        })
        .await
        .map_err(|e| MemoryError::Internal(e.to_string()))??;

        self.metrics.record("store_chat", started.elapsed());
        Ok(id)
    }

    pub async fn store_memory(&self, record: MemoryRecord) -> Result<MemoryId> {
        let memory = self.memory.clone();
        tokio::task::spawn_blocking(move || memory.store(record)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn search_memories(&self, query: SearchQuery) -> Result<Vec<crate::types::SearchResult>> {
        let search = self.search.clone();
        tokio::task::spawn_blocking(move || search.search(&query)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn by_relationship(&self, query: RelationshipQuery) -> Result<Vec<QueryMatch>> {
        let relationships = self.relationships.clone();
        tokio::task::spawn_blocking(move || relationships.query(query)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn related_to(&self, memory_id: MemoryId, max_depth: usize, namespace: String) -> Result<Network> {
        let relationships = self.relationships.clone();
        tokio::task::spawn_blocking(move || relationships.network(&memory_id, max_depth, &namespace))
            .await
            .map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn store_relationships(&self, memory_id: MemoryId, namespace: String, relationships: Vec<Relationship>) -> Result<StoreOutcome> {
        let engine = self.relationships.clone();
        tokio::task::spawn_blocking(move || engine.store(&memory_id, &namespace, relationships))
            .await
            .map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn resolve_conflicts(&self, memory_id: MemoryId, namespace: String) -> Result<Vec<crate::relationships::conflict::ConflictReport>> {
        let engine = self.relationships.clone();
        tokio::task::spawn_blocking(move || engine.resolve_conflicts(&memory_id, &namespace))
            .await
            .map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn get_memory_state(&self, memory_id: MemoryId) -> Result<MemoryState> {
        let state_manager = self.state_manager.clone();
        tokio::task::spawn_blocking(move || state_manager.current(&memory_id)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn state_history(&self, memory_id: MemoryId) -> Result<Vec<StateTransition>> {
        let state_manager = self.state_manager.clone();
        tokio::task::spawn_blocking(move || state_manager.history(&memory_id)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn transition_memory_state(&self, memory_id: MemoryId, target: MemoryState, reason: Option<String>) -> Result<StateTransition> {
        let state_manager = self.state_manager.clone();
        tokio::task::spawn_blocking(move || state_manager.transition(&memory_id, target, reason, None, None))
            .await
            .map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn detect_duplicates(&self, content: String, namespace: String) -> Result<Vec<Candidate>> {
        let engine = self.consolidation.clone();
        tokio::task::spawn_blocking(move || engine.detect(&content, &namespace, None)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn consolidate(&self, primary_id: MemoryId, duplicate_ids: Vec<MemoryId>) -> Result<ConsolidationResult> {
        let engine = self.consolidation.clone();
        tokio::task::spawn_blocking(move || engine.consolidate(&primary_id, &duplicate_ids))
            .await
            .map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn rollback_consolidation(&self, primary_id: MemoryId, token: String) -> Result<RollbackOutcome> {
        let engine = self.consolidation.clone();
        tokio::task::spawn_blocking(move || engine.rollback(&primary_id, &token)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn cleanup_old(&self, days: i64, dry_run: bool) -> Result<CleanupOutcome> {
        let engine = self.consolidation.clone();
        tokio::task::spawn_blocking(move || engine.cleanup_old(days, dry_run)).await.map_err(|e| MemoryError::Internal(e.to_string()))?
    }

    pub async fn health(&self) -> Result<HealthProbe> {
        let storage = self.storage.clone();
        Ok(tokio::task::spawn_blocking(move || health::probe(&storage)).await.map_err(|e| MemoryError::Internal(e.to_string()))?)
    }

    pub async fn index_health(&self) -> Result<crate::search::IndexHealth> {
        let index = self.index.clone();
        Ok(tokio::task::spawn_blocking(move || index.health_report()).await.map_err(|e| MemoryError::Internal(e.to_string()))??.health)
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let state_manager = self.state_manager.clone();
        let consolidation = self.consolidation.clone();
        let metrics_snapshot = self.metrics.snapshot();
        let (state, consolidation) = tokio::task::spawn_blocking(move || -> Result<_> { Ok((state_manager.metrics()?, consolidation.analytics()?)) })
            .await
            .map_err(|e| MemoryError::Internal(e.to_string()))??;
        Ok(EngineStats { state, consolidation, query_metrics_count: metrics_snapshot.len() })
    }

    /// Start the consolidation sweep on a `tokio::time::interval`. Replaces
    /// any previously running schedule.
    pub fn start_consolidation_schedule(&self, config: scheduler::SchedulerConfig) {
        let handle = scheduler::start(self.consolidation.clone(), config);
        let mut slot = self.scheduler.lock();
        if let Some(old) = slot.replace(handle) {
            old.stop();
        }
    }

    pub fn stop_consolidation_schedule(&self) {
        if let Some(handle) = self.scheduler.lock().take() {
            handle.stop();
        }
    }

    /// Stop the scheduler and drop references to the storage layer. The
    /// underlying `rusqlite::Connection` closes when its last `Arc` drops.
    pub async fn close(&self) {
        self.stop_consolidation_schedule();
    }

    pub fn memory_manager(&self) -> &MemoryManager {
        &self.memory
    }
}
