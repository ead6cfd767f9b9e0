//! Memory Manager (§4.3, component C): validates and persists memory
//! records, drives their initial state transitions, and serves
//! namespace-scoped reads.

pub mod validation;

use std::sync::Arc;

use rusqlite::{params, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::state::StateManager;
use crate::store::Storage;
use crate::types::{Classification, Importance, MemoryRecord, MemoryState};

const RECORD_TABLES: [&str; 2] = ["short_term_memory", "long_term_memory"];

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub order_by_created_at_asc: bool,
}

/// Sparse patch applied by [`MemoryManager::update`]. `None` fields are
/// left untouched; an entirely empty patch is a documented no-op.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub classification: Option<Classification>,
    pub importance: Option<Importance>,
    pub topic: Option<Option<String>>,
    pub entities: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub confidence_score: Option<f64>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.summary.is_none()
            && self.classification.is_none()
            && self.importance.is_none()
            && self.topic.is_none()
            && self.entities.is_none()
            && self.keywords.is_none()
            && self.confidence_score.is_none()
    }
}

pub struct MemoryManager {
    storage: Arc<Storage>,
    state_manager: Arc<StateManager>,
    max_content_length: usize,
}

impl MemoryManager {
    pub fn new(storage: Arc<Storage>, state_manager: Arc<StateManager>, max_content_length: usize) -> Self {
        Self { storage, state_manager, max_content_length }
    }

    /// Persist `record`, assigning an id when absent, and drive it through
    /// PENDING → PROCESSING → PROCESSED (§4.3, ingest control flow).
    #[instrument(skip(self, record), fields(namespace = %record.namespace))]
    pub fn store(&self, mut record: MemoryRecord) -> Result<String> {
        validation::validate_record(&record, self.max_content_length)?;
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        self.storage.with_connection(|conn| {
            conn.execute(
                "INSERT INTO short_term_memory (
                    id, namespace, content, summary, classification, importance, topic,
                    entities, keywords, confidence_score, classification_reason,
                    created_at, updated_at, extraction_timestamp, relationships, supersedes,
                    conscious_processed, consolidation, state
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,'PENDING')",
                params![
                    record.id,
                    record.namespace,
                    record.content,
                    record.summary,
                    record.classification.as_str(),
                    record.importance.as_str(),
                    record.topic,
                    serde_json::to_string(&record.entities)?,
                    serde_json::to_string(&record.keywords)?,
                    record.confidence_score,
                    record.classification_reason,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    record.extraction_timestamp.to_rfc3339(),
                    serde_json::to_string(&record.relationships)?,
                    serde_json::to_string(&record.supersedes)?,
                    record.conscious_processed as i64,
                    record.consolidation.as_ref().map(serde_json::to_string).transpose()?,
                ],
            )?;
            Ok(())
        })?;

        self.state_manager.transition(&record.id, MemoryState::Processing, None, None, None)?;
        self.state_manager.transition(&record.id, MemoryState::Processed, None, None, None)?;

        Ok(record.id)
    }

    pub fn get(&self, id: &str, namespace: &str) -> Result<Option<MemoryRecord>> {
        self.storage.with_connection(|conn| {
            for table in RECORD_TABLES {
                let found = conn
                    .query_row(
                        &format!("SELECT * FROM {table} WHERE id = ?1 AND namespace = ?2"),
                        params![id, namespace],
                        row_to_record,
                    )
                    .ok();
                if found.is_some() {
                    return Ok(found);
                }
            }
            Ok(None)
        })
    }

    pub fn list_by_namespace(&self, namespace: &str, opts: ListOptions) -> Result<Vec<MemoryRecord>> {
        let order = if opts.order_by_created_at_asc { "ASC" } else { "DESC" };
        self.storage.with_connection(|conn| {
            let mut records = Vec::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!(
                    "SELECT * FROM {table} WHERE namespace = ?1 ORDER BY created_at {order}"
                ))?;
                let found = stmt.query_map(params![namespace], row_to_record)?;
                for record in found {
                    records.push(record?);
                }
            }
            records.sort_by(|a, b| if opts.order_by_created_at_asc {
                a.created_at.cmp(&b.created_at)
            } else {
                b.created_at.cmp(&a.created_at)
            });
            if opts.offset > 0 {
                records = records.into_iter().skip(opts.offset).collect();
            }
            if opts.limit > 0 {
                records.truncate(opts.limit);
            }
            Ok(records)
        })
    }

    /// Records whose importance is ≥ `min_importance` (CRITICAL > HIGH > MEDIUM > LOW).
    pub fn list_by_importance(
        &self,
        min_importance: Importance,
        namespace: &str,
        opts: ListOptions,
    ) -> Result<Vec<MemoryRecord>> {
        let all = self.list_by_namespace(namespace, ListOptions { limit: 0, offset: 0, ..opts.clone() })?;
        let mut filtered: Vec<_> = all
            .into_iter()
            .filter(|record| record.importance >= min_importance)
            .collect();
        if opts.offset > 0 {
            filtered = filtered.into_iter().skip(opts.offset).collect();
        }
        if opts.limit > 0 {
            filtered.truncate(opts.limit);
        }
        Ok(filtered)
    }

    /// Apply `patch`. An empty patch returns `false` without writing.
    /// Issues a representational state transition on success when state
    /// tracking is enabled for the underlying record's table.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: &str, namespace: &str, patch: MemoryPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        let Some(mut record) = self.get(id, namespace)? else {
            return Ok(false);
        };

        if let Some(content) = patch.content {
            record.content = content;
        }
        if let Some(summary) = patch.summary {
            record.summary = summary;
        }
        if let Some(classification) = patch.classification {
            record.classification = classification;
        }
        if let Some(importance) = patch.importance {
            record.importance = importance;
        }
        if let Some(topic) = patch.topic {
            record.topic = topic;
        }
        if let Some(entities) = patch.entities {
            record.entities = entities;
        }
        if let Some(keywords) = patch.keywords {
            record.keywords = keywords;
        }
        if let Some(confidence_score) = patch.confidence_score {
            record.confidence_score = confidence_score;
        }
        record.updated_at = chrono::Utc::now();
        validation::validate_record(&record, self.max_content_length)?;

        let table = self.table_for(id)?;
        self.storage.with_connection(|conn| {
            conn.execute(
                &format!(
                    "UPDATE {table} SET content=?1, summary=?2, classification=?3, importance=?4,
                     topic=?5, entities=?6, keywords=?7, confidence_score=?8, updated_at=?9
                     WHERE id=?10 AND namespace=?11"
                ),
                params![
                    record.content,
                    record.summary,
                    record.classification.as_str(),
                    record.importance.as_str(),
                    record.topic,
                    serde_json::to_string(&record.entities)?,
                    serde_json::to_string(&record.keywords)?,
                    record.confidence_score,
                    record.updated_at.to_rfc3339(),
                    id,
                    namespace,
                ],
            )?;
            Ok(())
        })?;

        let current = self.state_manager.current(id)?;
        let _ = self
            .state_manager
            .transition(id, current, Some("record updated".into()), None, None);

        Ok(true)
    }

    /// Delete a record. When `cascade`, also strips relationships targeting
    /// it from every other record in the namespace (the FTS row disappears
    /// on its own via the delete trigger).
    pub fn delete(&self, id: &str, namespace: &str, cascade: bool) -> Result<bool> {
        let table = match self.table_for(id) {
            Ok(table) => table,
            Err(MemoryError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let deleted = self.storage.with_transaction(|conn| {
            let affected = conn.execute(
                &format!("DELETE FROM {table} WHERE id = ?1 AND namespace = ?2"),
                params![id, namespace],
            )?;
            if affected == 0 {
                return Ok(false);
            }
            if cascade {
                strip_relationship_targets(conn, id, namespace)?;
            }
            Ok(true)
        })?;
        let _ = self.state_manager.clear(id);
        Ok(deleted)
    }

    fn table_for(&self, id: &str) -> Result<&'static str> {
        self.storage.with_connection(|conn| {
            for table in RECORD_TABLES {
                let exists: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
                    params![id],
                    |row| row.get(0),
                )?;
                if exists > 0 {
                    return Ok(table);
                }
            }
            Err(MemoryError::NotFound(format!("memory record {id}")))
        })
    }
}

fn strip_relationship_targets(conn: &rusqlite::Connection, target_id: &str, namespace: &str) -> Result<()> {
    for table in RECORD_TABLES {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, relationships, supersedes FROM {table} WHERE namespace = ?1"
        ))?;
        let rows: Vec<(String, String, String)> = stmt
            .query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;
        for (origin_id, relationships_json, supersedes_json) in rows {
            let mut relationships: Vec<crate::types::Relationship> = serde_json::from_str(&relationships_json)?;
            let mut supersedes: Vec<crate::types::Relationship> = serde_json::from_str(&supersedes_json)?;
            let before = relationships.len() + supersedes.len();
            relationships.retain(|r| r.target_memory_id != target_id);
            supersedes.retain(|r| r.target_memory_id != target_id);
            if relationships.len() + supersedes.len() != before {
                conn.execute(
                    &format!("UPDATE {table} SET relationships = ?1, supersedes = ?2 WHERE id = ?3"),
                    params![
                        serde_json::to_string(&relationships)?,
                        serde_json::to_string(&supersedes)?,
                        origin_id,
                    ],
                )?;
            }
        }
    }
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let entities: String = row.get("entities")?;
    let keywords: String = row.get("keywords")?;
    let relationships: String = row.get("relationships")?;
    let supersedes: String = row.get("supersedes")?;
    let consolidation: Option<String> = row.get("consolidation")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let extraction_timestamp: String = row.get("extraction_timestamp")?;
    let classification: String = row.get("classification")?;
    let importance: String = row.get("importance")?;

    let parse_dt = |s: &str| {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now())
    };

    Ok(MemoryRecord {
        id: row.get("id")?,
        namespace: row.get("namespace")?,
        content: row.get("content")?,
        summary: row.get("summary")?,
        classification: classification.parse().unwrap_or(Classification::Conversational),
        importance: importance.parse().unwrap_or(Importance::Medium),
        topic: row.get("topic")?,
        entities: serde_json::from_str(&entities).unwrap_or_default(),
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        confidence_score: row.get("confidence_score")?,
        classification_reason: row.get("classification_reason")?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
        extraction_timestamp: parse_dt(&extraction_timestamp),
        relationships: serde_json::from_str(&relationships).unwrap_or_default(),
        supersedes: serde_json::from_str(&supersedes).unwrap_or_default(),
        conscious_processed: row.get::<_, i64>("conscious_processed")? != 0,
        consolidation: consolidation.and_then(|c| serde_json::from_str(&c).ok()),
    })
}
