//! Relationship Engine (§4.4, component D): relationships are stored
//! denormalized on the origin record in two lists (general vs.
//! SUPERSEDES) rather than a separate edge table, mirroring the teacher's
//! preference for embedding small bounded collections as JSON columns
//! over a join table when the collection never needs independent
//! indexing.

pub mod conflict;
pub mod consistency;
pub mod extraction;
pub mod network;

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::params;
use tracing::instrument;

use crate::error::{MemoryError, Result};
use crate::store::Storage;
use crate::types::{Relationship, RelationshipType};

const RECORD_TABLES: [&str; 2] = ["short_term_memory", "long_term_memory"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipOp {
    Add,
    Update,
    Remove,
}

#[derive(Debug, Default)]
pub struct StoreOutcome {
    pub stored: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct RelationshipQuery {
    pub relationship_type: Option<RelationshipType>,
    pub source_memory_id: Option<String>,
    pub target_memory_id: Option<String>,
    pub min_confidence: Option<f64>,
    pub min_strength: Option<f64>,
    pub namespace: String,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub source_memory_id: String,
    pub relationship: Relationship,
}

pub struct RelationshipEngine {
    storage: Arc<Storage>,
    max_relationships_per_memory: usize,
    conflict_confidence_variance: f64,
}

struct RecordRow {
    table: &'static str,
    relationships: Vec<Relationship>,
    supersedes: Vec<Relationship>,
}

impl RelationshipEngine {
    pub fn new(storage: Arc<Storage>, max_relationships_per_memory: usize) -> Self {
        Self { storage, max_relationships_per_memory, conflict_confidence_variance: 0.5 }
    }

    pub fn with_conflict_confidence_variance(mut self, variance: f64) -> Self {
        self.conflict_confidence_variance = variance;
        self
    }

    fn load(&self, id: &str, namespace: &str) -> Result<RecordRow> {
        self.storage.with_connection(|conn| {
            for table in RECORD_TABLES {
                let row: Option<(String, String)> = conn
                    .query_row(
                        &format!("SELECT relationships, supersedes FROM {table} WHERE id = ?1 AND namespace = ?2"),
                        params![id, namespace],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .ok();
                if let Some((relationships_json, supersedes_json)) = row {
                    return Ok(RecordRow {
                        table,
                        relationships: serde_json::from_str(&relationships_json)?,
                        supersedes: serde_json::from_str(&supersedes_json)?,
                    });
                }
            }
            Err(MemoryError::NotFound(format!("memory record {id}")))
        })
    }

    fn save(&self, table: &str, id: &str, relationships: &[Relationship], supersedes: &[Relationship]) -> Result<()> {
        self.storage.with_connection(|conn| {
            conn.execute(
                &format!("UPDATE {table} SET relationships = ?1, supersedes = ?2 WHERE id = ?3"),
                params![serde_json::to_string(relationships)?, serde_json::to_string(supersedes)?, id],
            )?;
            Ok(())
        })
    }

    fn load_namespace(&self, namespace: &str) -> Result<HashMap<String, RecordRow>> {
        self.storage.with_connection(|conn| {
            let mut out = HashMap::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, relationships, supersedes FROM {table} WHERE namespace = ?1"
                ))?;
                let rows: Vec<(String, String, String)> = stmt
                    .query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<std::result::Result<_, _>>()?;
                for (id, relationships_json, supersedes_json) in rows {
                    out.insert(
                        id,
                        RecordRow {
                            table,
                            relationships: serde_json::from_str(&relationships_json)?,
                            supersedes: serde_json::from_str(&supersedes_json)?,
                        },
                    );
                }
            }
            Ok(out)
        })
    }

    /// `(type, target)` identity merge: keep the pointwise-greater entry,
    /// or the higher-confidence one when mixed (§4.4 Store rule).
    fn merge(existing: Vec<Relationship>, incoming: Vec<Relationship>) -> Vec<Relationship> {
        let mut merged = existing;
        for new_rel in incoming {
            let slot = merged.iter_mut().find(|r| r.relationship_type == new_rel.relationship_type && r.target_memory_id == new_rel.target_memory_id);
            match slot {
                None => merged.push(new_rel),
                Some(current) => {
                    let new_dominates = new_rel.confidence >= current.confidence && new_rel.strength >= current.strength;
                    let current_dominates = current.confidence >= new_rel.confidence && current.strength >= new_rel.strength;
                    if new_dominates && !current_dominates {
                        *current = new_rel;
                    } else if !new_dominates && !current_dominates && new_rel.confidence > current.confidence {
                        *current = new_rel;
                    }
                }
            }
        }
        merged
    }

    #[instrument(skip(self, relationships))]
    pub fn store(&self, memory_id: &str, namespace: &str, relationships: Vec<Relationship>) -> Result<StoreOutcome> {
        let mut errors = Vec::new();
        for r in &relationships {
            if let Err(e) = r.validate() {
                errors.push(e.to_string());
            }
        }
        if !errors.is_empty() {
            return Ok(StoreOutcome { stored: 0, errors });
        }

        let (general, supersedes): (Vec<_>, Vec<_>) =
            relationships.into_iter().partition(|r| r.relationship_type != RelationshipType::Supersedes);

        let record = self.load(memory_id, namespace)?;
        let merged_general = Self::merge(record.relationships, general);
        let merged_supersedes = Self::merge(record.supersedes, supersedes);

        let total = merged_general.len() + merged_supersedes.len();
        if total > self.max_relationships_per_memory {
            return Ok(StoreOutcome {
                stored: 0,
                errors: vec![format!(
                    "relationship count {total} exceeds maxRelationshipsPerMemory {}",
                    self.max_relationships_per_memory
                )],
            });
        }

        self.save(record.table, memory_id, &merged_general, &merged_supersedes)?;
        Ok(StoreOutcome { stored: merged_general.len() + merged_supersedes.len(), errors: vec![] })
    }

    pub fn update(
        &self,
        memory_id: &str,
        namespace: &str,
        ops: Vec<(Relationship, RelationshipOp)>,
    ) -> Result<UpdateOutcome> {
        let record = self.load(memory_id, namespace)?;
        let (mut general, mut supersedes) = (record.relationships, record.supersedes);
        let mut updated = 0usize;
        let mut errors = Vec::new();

        for (rel, op) in ops {
            let target_list = if rel.relationship_type == RelationshipType::Supersedes {
                &mut supersedes
            } else {
                &mut general
            };
            let position = target_list
                .iter()
                .position(|r| r.relationship_type == rel.relationship_type && r.target_memory_id == rel.target_memory_id);

            match op {
                RelationshipOp::Add => {
                    if position.is_none() {
                        if let Err(e) = rel.validate() {
                            errors.push(e.to_string());
                            continue;
                        }
                        target_list.push(rel);
                        updated += 1;
                    }
                }
                RelationshipOp::Update => match position {
                    Some(idx) => {
                        if let Err(e) = rel.validate() {
                            errors.push(e.to_string());
                            continue;
                        }
                        target_list[idx] = rel;
                        updated += 1;
                    }
                    None => errors.push(format!(
                        "cannot update non-existent relationship ({:?}, {})",
                        rel.relationship_type, rel.target_memory_id
                    )),
                },
                RelationshipOp::Remove => {
                    if let Some(idx) = position {
                        target_list.remove(idx);
                        updated += 1;
                    }
                }
            }
        }

        self.save(record.table, memory_id, &general, &supersedes)?;
        Ok(UpdateOutcome { updated, errors })
    }

    pub fn query(&self, q: RelationshipQuery) -> Result<Vec<QueryMatch>> {
        let records = self.load_namespace(&q.namespace)?;
        let mut matches = Vec::new();

        for (id, row) in &records {
            if let Some(ref source) = q.source_memory_id {
                if source != id {
                    continue;
                }
            }
            for rel in row.relationships.iter().chain(row.supersedes.iter()) {
                if let Some(t) = q.relationship_type {
                    if rel.relationship_type != t {
                        continue;
                    }
                }
                if let Some(ref target) = q.target_memory_id {
                    if &rel.target_memory_id != target {
                        continue;
                    }
                }
                if let Some(min_confidence) = q.min_confidence {
                    if rel.confidence < min_confidence {
                        continue;
                    }
                }
                if let Some(min_strength) = q.min_strength {
                    if rel.strength < min_strength {
                        continue;
                    }
                }
                matches.push(QueryMatch { source_memory_id: id.clone(), relationship: rel.clone() });
            }
        }

        matches.sort_by(|a, b| {
            let score_a = (a.relationship.confidence + a.relationship.strength) / 2.0;
            let score_b = (b.relationship.confidence + b.relationship.strength) / 2.0;
            score_b.partial_cmp(&score_a).unwrap()
        });
        if q.limit > 0 {
            matches.truncate(q.limit);
        }
        Ok(matches)
    }

    pub fn network(&self, memory_id: &str, max_depth: usize, namespace: &str) -> Result<network::Network> {
        let records = self.load_namespace(namespace)?;
        let mut outgoing: HashMap<String, Vec<Relationship>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<Relationship>> = HashMap::new();

        for (id, row) in &records {
            let all: Vec<_> = row.relationships.iter().chain(row.supersedes.iter()).cloned().collect();
            for rel in &all {
                incoming.entry(rel.target_memory_id.clone()).or_default().push(Relationship {
                    target_memory_id: id.clone(),
                    ..rel.clone()
                });
            }
            outgoing.insert(id.clone(), all);
        }

        Ok(network::traverse(memory_id, max_depth, &outgoing, &incoming))
    }

    /// Detect and resolve conflicts on one record's relationship set,
    /// persisting the resolution (§4.4 conflict resolution).
    pub fn resolve_conflicts(&self, memory_id: &str, namespace: &str) -> Result<Vec<conflict::ConflictReport>> {
        let record = self.load(memory_id, namespace)?;
        let all: Vec<_> = record.relationships.iter().chain(record.supersedes.iter()).cloned().collect();
        let conflicts = conflict::detect(&all, self.conflict_confidence_variance);
        if conflicts.is_empty() {
            return Ok(conflicts);
        }
        let resolved = conflict::resolve(&all, &conflicts);
        let (general, supersedes): (Vec<_>, Vec<_>) =
            resolved.into_iter().partition(|r| r.relationship_type != RelationshipType::Supersedes);
        self.save(record.table, memory_id, &general, &supersedes)?;
        Ok(conflicts)
    }

    pub fn consistency_report(&self, namespace: &str) -> Result<consistency::ConsistencyReport> {
        let records = self.load_namespace(namespace)?;
        let edges: HashMap<String, Vec<Relationship>> =
            records.into_iter().map(|(id, row)| (id, row.relationships)).collect();
        Ok(consistency::check(&edges))
    }
}
