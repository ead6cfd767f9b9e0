//! Consolidation Engine (§4.7, component G): duplicate detection,
//! atomic consolidation with a rollback snapshot, scheduled sweeps.

pub mod scheduler;
pub mod similarity;

use std::sync::Arc;

use rusqlite::params;
use sha2::{Digest, Sha256};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::state::StateManager;
use crate::store::Storage;
use crate::types::{ConsolidationMetadata, MemoryState};

pub use similarity::Recommendation;
use similarity::SimilarityScore;

const RECORD_TABLES: [&str; 2] = ["short_term_memory", "long_term_memory"];
const MAX_DUPLICATES: usize = 100;
const WARN_DUPLICATES: usize = 50;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Candidate {
    pub memory_id: String,
    pub similarity: SimilarityScore,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsolidationResult {
    pub primary_id: String,
    pub consolidated_from: Vec<String>,
    pub data_integrity_hash: String,
    pub rollback_token: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Eligibility {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub restored: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CleanupOutcome {
    pub cleaned: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsolidationAnalytics {
    pub total_consolidated: i64,
    pub total_duplicates: i64,
    pub overall_health: String,
}

/// Minimal field set hashed into `dataIntegrityHash`, serialized in this
/// fixed order — the exact order `serde_json` writes struct fields in,
/// not alphabetical (§4.7.1).
#[derive(serde::Serialize)]
struct CanonicalSnapshot {
    id: String,
    namespace: String,
    content: String,
    summary: String,
    classification: String,
    importance: String,
    topic: Option<String>,
    entities: Vec<String>,
    keywords: Vec<String>,
    confidence_score: f64,
}

struct RecordRow {
    table: &'static str,
    id: String,
    namespace: String,
    content: String,
    summary: String,
    classification: String,
    importance: String,
    topic: Option<String>,
    entities: Vec<String>,
    keywords: Vec<String>,
    confidence_score: f64,
    consolidation: Option<ConsolidationMetadata>,
}

pub struct ConsolidationEngine {
    storage: Arc<Storage>,
    state_manager: Arc<StateManager>,
    similarity_threshold: f64,
}

impl ConsolidationEngine {
    pub fn new(storage: Arc<Storage>, state_manager: Arc<StateManager>, similarity_threshold: f64) -> Self {
        Self { storage, state_manager, similarity_threshold }
    }

    fn load_row(&self, id: &str) -> Result<RecordRow> {
        self.storage.with_connection(|conn| {
            for table in RECORD_TABLES {
                let row: Option<(String, String, String, String, String, String, Option<String>, String, String, f64, Option<String>)> = conn
                    .query_row(
                        &format!(
                            "SELECT id, namespace, content, summary, classification, importance, topic, entities, keywords, confidence_score, consolidation
                             FROM {table} WHERE id = ?1"
                        ),
                        params![id],
                        |row| {
                            Ok((
                                row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?,
                                row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?,
                            ))
                        },
                    )
                    .ok();
                if let Some((id, namespace, content, summary, classification, importance, topic, entities, keywords, confidence_score, consolidation)) = row {
                    return Ok(RecordRow {
                        table,
                        id,
                        namespace,
                        content,
                        summary,
                        classification,
                        importance,
                        topic,
                        entities: serde_json::from_str(&entities)?,
                        keywords: serde_json::from_str(&keywords)?,
                        confidence_score,
                        consolidation: consolidation.and_then(|c| serde_json::from_str(&c).ok()),
                    });
                }
            }
            Err(MemoryError::NotFound(format!("memory record {id}")))
        })
    }

    /// Most recently updated primaries in `namespace` — records not already
    /// marked as someone else's duplicate — bounded to `limit`, used by the
    /// scheduler to pick sweep targets.
    pub fn recent_primaries(&self, namespace: &str, limit: usize) -> Result<Vec<String>> {
        self.storage.with_connection(|conn| {
            let mut ids = Vec::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, consolidation FROM {table} WHERE namespace = ?1 ORDER BY updated_at DESC LIMIT ?2"
                ))?;
                let rows: Vec<(String, Option<String>)> =
                    stmt.query_map(params![namespace, limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<std::result::Result<_, _>>()?;
                for (id, consolidation) in rows {
                    let is_duplicate = consolidation.and_then(|c| serde_json::from_str::<ConsolidationMetadata>(&c).ok()).is_some_and(|m| m.is_duplicate);
                    if !is_duplicate {
                        ids.push(id);
                    }
                }
            }
            ids.truncate(limit);
            Ok(ids)
        })
    }

    pub fn content_of(&self, id: &str) -> Result<Option<String>> {
        match self.load_row(id) {
            Ok(row) => Ok(Some(row.content)),
            Err(MemoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Candidates in `namespace` whose confidence against `content` clears
    /// `threshold` (defaults to this engine's configured threshold when
    /// `threshold` is `None`).
    pub fn detect(&self, content: &str, namespace: &str, threshold: Option<f64>) -> Result<Vec<Candidate>> {
        let threshold = threshold.unwrap_or(self.similarity_threshold);
        self.storage.with_connection(|conn| {
            let mut candidates = Vec::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!("SELECT id, content FROM {table} WHERE namespace = ?1"))?;
                let rows: Vec<(String, String)> =
                    stmt.query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<std::result::Result<_, _>>()?;
                for (id, other_content) in rows {
                    let score = similarity::score(content, &other_content);
                    if score.confidence >= threshold {
                        candidates.push(Candidate { memory_id: id, similarity: score });
                    }
                }
            }
            candidates.sort_by(|a, b| b.similarity.confidence.partial_cmp(&a.similarity.confidence).unwrap());
            Ok(candidates)
        })
    }

    pub fn mark_duplicate(&self, dup_id: &str, orig_id: &str, reason: &str) -> Result<()> {
        let row = self.load_row(dup_id)?;
        let mut consolidation = row.consolidation.unwrap_or_default();
        consolidation.is_duplicate = true;
        consolidation.duplicate_of = Some(orig_id.to_string());
        consolidation.consolidation_reason = Some(reason.to_string());
        self.storage.with_connection(|conn| {
            conn.execute(
                &format!("UPDATE {} SET consolidation = ?1 WHERE id = ?2", row.table),
                params![serde_json::to_string(&consolidation)?, dup_id],
            )?;
            Ok(())
        })
    }

    pub fn validate_eligibility(&self, primary_id: &str, dup_ids: &[String]) -> Result<Eligibility> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if dup_ids.len() > MAX_DUPLICATES {
            errors.push(format!("{} duplicate ids exceeds the 100 limit", dup_ids.len()));
        } else if dup_ids.len() > WARN_DUPLICATES {
            warnings.push(format!("{} duplicate ids is unusually large", dup_ids.len()));
        }

        let primary = self.load_row(primary_id);
        if primary.is_err() {
            errors.push(format!("primary {primary_id} not found"));
        }

        for dup_id in dup_ids {
            if dup_id == primary_id {
                errors.push(format!("{dup_id} cannot be a duplicate of itself"));
                continue;
            }
            match self.load_row(dup_id) {
                Ok(row) => {
                    if row.consolidation.as_ref().is_some_and(|c| c.is_duplicate) {
                        warnings.push(format!("{dup_id} is already marked as a duplicate"));
                    }
                }
                Err(_) => errors.push(format!("duplicate {dup_id} not found")),
            }
        }

        Ok(Eligibility { is_valid: errors.is_empty(), errors, warnings })
    }

    pub fn preview_consolidation(&self, primary_id: &str, dup_ids: &[String]) -> Result<Eligibility> {
        self.validate_eligibility(primary_id, dup_ids)
    }

    /// Atomically fold `dup_ids` into `primary_id` (§4.7).
    #[instrument(skip(self))]
    pub fn consolidate(&self, primary_id: &str, dup_ids: &[String]) -> Result<ConsolidationResult> {
        let eligibility = self.validate_eligibility(primary_id, dup_ids)?;
        if !eligibility.is_valid {
            return Err(MemoryError::Validation(eligibility.errors.join("; ")));
        }

        let primary = self.load_row(primary_id)?;
        let mut sorted_entities = primary.entities.clone();
        sorted_entities.sort();
        let mut sorted_keywords = primary.keywords.clone();
        sorted_keywords.sort();

        let snapshot = CanonicalSnapshot {
            id: primary.id.clone(),
            namespace: primary.namespace.clone(),
            content: primary.content.clone(),
            summary: primary.summary.clone(),
            classification: primary.classification.clone(),
            importance: primary.importance.clone(),
            topic: primary.topic.clone(),
            entities: sorted_entities,
            keywords: sorted_keywords,
            confidence_score: primary.confidence_score,
        };
        let canonical_json = serde_json::to_string(&snapshot)?;
        let digest = Sha256::digest(canonical_json.as_bytes());
        let hash = hex::encode(digest)[..16].to_string();
        let token = Uuid::new_v4().to_string();

        // Pre-consolidation snapshot of every affected row, used by rollback.
        let mut pre_snapshot_rows = Vec::new();
        self.storage.with_connection(|conn| {
            for id in std::iter::once(primary_id).chain(dup_ids.iter().map(|s| s.as_str())) {
                for table in RECORD_TABLES {
                    let row: Option<String> = conn
                        .query_row(&format!("SELECT * FROM {table} WHERE id = ?1"), params![id], |_| Ok(String::new()))
                        .ok();
                    if row.is_some() {
                        let full: serde_json::Value = conn.query_row(
                            &format!(
                                "SELECT json_object('table', '{table}', 'id', id, 'namespace', namespace, 'content', content,
                                 'summary', summary, 'classification', classification, 'importance', importance, 'topic', topic,
                                 'entities', entities, 'keywords', keywords, 'confidence_score', confidence_score,
                                 'classification_reason', classification_reason, 'created_at', created_at, 'updated_at', updated_at,
                                 'extraction_timestamp', extraction_timestamp, 'relationships', relationships, 'supersedes', supersedes,
                                 'conscious_processed', conscious_processed, 'consolidation', consolidation, 'state', state)
                                 FROM {table} WHERE id = ?1"
                            ),
                            params![id],
                            |row| row.get::<_, String>(0),
                        ).map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::Null))?;
                        pre_snapshot_rows.push(full);
                        break;
                    }
                }
            }
            Ok(())
        })?;

        self.storage.with_transaction(|conn| {
            let mut primary_consolidation = primary.consolidation.clone().unwrap_or_default();
            primary_consolidation.is_consolidated = true;
            primary_consolidation.consolidated_from.extend(dup_ids.iter().cloned());
            primary_consolidation.original_data_hash = Some(hash.clone());
            primary_consolidation.rollback_token = Some(token.clone());
            conn.execute(
                &format!("UPDATE {} SET consolidation = ?1 WHERE id = ?2", primary.table),
                params![serde_json::to_string(&primary_consolidation)?, primary_id],
            )?;

            for dup_id in dup_ids {
                for table in RECORD_TABLES {
                    let exists: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
                        params![dup_id],
                        |row| row.get(0),
                    )?;
                    if exists == 0 {
                        continue;
                    }
                    let consolidation: Option<String> =
                        conn.query_row(&format!("SELECT consolidation FROM {table} WHERE id = ?1"), params![dup_id], |row| row.get(0))?;
                    let mut meta: ConsolidationMetadata = consolidation.and_then(|c| serde_json::from_str(&c).ok()).unwrap_or_default();
                    meta.is_duplicate = true;
                    meta.duplicate_of = Some(primary_id.to_string());
                    meta.consolidated_at = Some(chrono::Utc::now());
                    meta.rollback_token = Some(token.clone());
                    conn.execute(
                        &format!("UPDATE {table} SET consolidation = ?1 WHERE id = ?2"),
                        params![serde_json::to_string(&meta)?, dup_id],
                    )?;
                    break;
                }
            }

            conn.execute(
                "INSERT INTO rollback_snapshots (token, primary_id, created_at, snapshot) VALUES (?1, ?2, ?3, ?4)",
                params![token, primary_id, chrono::Utc::now().to_rfc3339(), serde_json::to_string(&pre_snapshot_rows)?],
            )?;
            Ok(())
        })?;

        for target_state in [
            MemoryState::DuplicateCheckPending,
            MemoryState::DuplicateCheckProcessing,
            MemoryState::ConsolidationPending,
            MemoryState::ConsolidationProcessing,
            MemoryState::Consolidated,
        ] {
            if let Err(e) = self.state_manager.transition(primary_id, target_state, None, None, None) {
                warn!(primary_id, error = %e, "consolidation state transition failed; write already committed");
            }
        }

        Ok(ConsolidationResult {
            primary_id: primary_id.to_string(),
            consolidated_from: dup_ids.to_vec(),
            data_integrity_hash: hash,
            rollback_token: token,
        })
    }

    /// Restore the pre-consolidation snapshot captured under `token`.
    pub fn rollback(&self, primary_id: &str, token: &str) -> Result<RollbackOutcome> {
        if token.trim().is_empty() {
            return Ok(RollbackOutcome { success: false, restored: 0, errors: vec!["rollback token must not be empty".into()] });
        }

        let snapshot_json: Option<String> = self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT snapshot FROM rollback_snapshots WHERE token = ?1 AND primary_id = ?2",
                    params![token, primary_id],
                    |row| row.get(0),
                )
                .ok())
        })?;

        let Some(snapshot_json) = snapshot_json else {
            return Ok(RollbackOutcome { success: false, restored: 0, errors: vec!["rollback token not found".into()] });
        };

        let rows: Vec<serde_json::Value> = serde_json::from_str(&snapshot_json)?;
        let mut restored = 0usize;

        self.storage.with_transaction(|conn| {
            for row in &rows {
                let table = row["table"].as_str().unwrap_or("long_term_memory");
                conn.execute(
                    &format!(
                        "UPDATE {table} SET content=?1, summary=?2, classification=?3, importance=?4, topic=?5,
                         entities=?6, keywords=?7, confidence_score=?8, consolidation=?9 WHERE id=?10"
                    ),
                    params![
                        row["content"].as_str(),
                        row["summary"].as_str(),
                        row["classification"].as_str(),
                        row["importance"].as_str(),
                        row["topic"].as_str(),
                        row["entities"].to_string(),
                        row["keywords"].to_string(),
                        row["confidence_score"].as_f64(),
                        row["consolidation"].to_string(),
                        row["id"].as_str(),
                    ],
                )?;
                restored += 1;
            }
            conn.execute("DELETE FROM rollback_snapshots WHERE token = ?1", params![token])?;
            Ok(())
        })?;

        Ok(RollbackOutcome { success: true, restored, errors: vec![] })
    }

    pub fn cleanup_old(&self, days: i64, dry_run: bool) -> Result<CleanupOutcome> {
        let threshold = chrono::Utc::now() - chrono::Duration::days(days);
        let mut outcome = CleanupOutcome::default();

        let candidates: Vec<String> = self.storage.with_connection(|conn| {
            let mut ids = Vec::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id FROM {table} WHERE state = 'CONSOLIDATED' AND updated_at < ?1"
                ))?;
                let found = stmt.query_map(params![threshold.to_rfc3339()], |row| row.get::<_, String>(0))?;
                for id in found {
                    ids.push(id?);
                }
            }
            Ok(ids)
        })?;

        for id in candidates {
            if dry_run {
                outcome.skipped += 1;
                continue;
            }
            match self
                .state_manager
                .transition(&id, MemoryState::CleanupPending, None, None, None)
                .and_then(|_| self.state_manager.transition(&id, MemoryState::CleanupProcessing, None, None, None))
                .and_then(|_| self.state_manager.transition(&id, MemoryState::Cleaned, None, None, None))
            {
                Ok(_) => outcome.cleaned += 1,
                Err(e) => outcome.errors.push(format!("{id}: {e}")),
            }
        }

        Ok(outcome)
    }

    pub fn analytics(&self) -> Result<ConsolidationAnalytics> {
        self.storage.with_connection(|conn| {
            let mut total_consolidated = 0i64;
            let mut total_duplicates = 0i64;
            let mut total_records = 0i64;
            for table in RECORD_TABLES {
                total_records += conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get::<_, i64>(0))?;
                let mut stmt = conn.prepare(&format!("SELECT consolidation FROM {table} WHERE consolidation IS NOT NULL"))?;
                let rows: Vec<String> = stmt.query_map([], |row| row.get(0))?.collect::<std::result::Result<_, _>>()?;
                for raw in rows {
                    if let Ok(meta) = serde_json::from_str::<ConsolidationMetadata>(&raw) {
                        if meta.is_consolidated {
                            total_consolidated += 1;
                        }
                        if meta.is_duplicate {
                            total_duplicates += 1;
                        }
                    }
                }
            }
            let ratio = if total_records == 0 { 0.0 } else { total_duplicates as f64 / total_records as f64 };
            let overall_health = if ratio > 0.5 { "poor" } else { "good" }.to_string();
            Ok(ConsolidationAnalytics { total_consolidated, total_duplicates, overall_health })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateManagerConfig;

    fn engine() -> (ConsolidationEngine, Arc<Storage>) {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let state_manager = Arc::new(StateManager::new(storage.clone(), StateManagerConfig::default()));
        (ConsolidationEngine::new(storage.clone(), state_manager, 0.7), storage)
    }

    fn insert(storage: &Storage, id: &str, content: &str, state: &str) {
        storage
            .with_connection(|conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp, state)
                         VALUES ('{id}', 'default', '{content}', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '{state}')"
                    ),
                    [],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn detect_finds_similar_content() {
        let (engine, storage) = engine();
        insert(&storage, "a", "the quick brown fox jumps over the lazy dog", "PROCESSED");
        let candidates = engine.detect("the quick brown fox jumps over the lazy dog", "default", None).unwrap();
        assert!(!candidates.is_empty());
    }

    #[test]
    fn consolidate_marks_duplicates_and_sets_hash() {
        let (engine, storage) = engine();
        insert(&storage, "primary", "canonical content about rust ownership", "PROCESSED");
        insert(&storage, "dup1", "duplicate content about rust ownership", "PROCESSED");

        let result = engine.consolidate("primary", &["dup1".to_string()]).unwrap();
        assert_eq!(result.data_integrity_hash.len(), 16);

        storage
            .with_connection(|conn| {
                let consolidation: String = conn.query_row("SELECT consolidation FROM long_term_memory WHERE id = 'dup1'", [], |r| r.get(0)).unwrap();
                let meta: ConsolidationMetadata = serde_json::from_str(&consolidation).unwrap();
                assert!(meta.is_duplicate);
                assert_eq!(meta.duplicate_of, Some("primary".to_string()));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn rollback_restores_pre_consolidation_state() {
        let (engine, storage) = engine();
        insert(&storage, "primary", "canonical content about rust ownership", "PROCESSED");
        insert(&storage, "dup1", "duplicate content about rust ownership", "PROCESSED");

        let result = engine.consolidate("primary", &["dup1".to_string()]).unwrap();
        let outcome = engine.rollback("primary", &result.rollback_token).unwrap();
        assert!(outcome.success);

        storage
            .with_connection(|conn| {
                let consolidation: String = conn.query_row("SELECT consolidation FROM long_term_memory WHERE id = 'dup1'", [], |r| r.get(0)).unwrap();
                let meta: ConsolidationMetadata = serde_json::from_str(&consolidation).unwrap();
                assert!(!meta.is_duplicate);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn rollback_rejects_empty_token() {
        let (engine, _storage) = engine();
        let outcome = engine.rollback("primary", "").unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn validate_eligibility_rejects_over_max_duplicates() {
        let (engine, storage) = engine();
        insert(&storage, "primary", "content", "PROCESSED");
        let dup_ids: Vec<String> = (0..101).map(|i| format!("dup{i}")).collect();
        let eligibility = engine.validate_eligibility("primary", &dup_ids).unwrap();
        assert!(!eligibility.is_valid);
    }
}
