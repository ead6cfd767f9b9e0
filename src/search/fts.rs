//! Full-text search strategy (§4.6): BM25-ranked queries against
//! `memory_fts`, metadata-filtered, positionally parameterized.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, ToSql};
use std::sync::Arc;

use crate::error::Result;
use crate::store::Storage;
use crate::types::{Importance, SearchResult};

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct FtsQuery {
    pub text: String,
    pub namespace: String,
    pub category_primary: Option<String>,
    pub min_importance: Option<Importance>,
    pub limit: usize,
    pub offset: usize,
}

pub struct FtsStrategy {
    storage: Arc<Storage>,
}

/// Strip FTS5 wildcard/operator characters and escape quotes, then join
/// terms as a phrase-OR query. An empty query matches everything.
fn sanitize_query(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '^' | ':' | '(' | ')'))
        .collect();
    let terms: Vec<String> = cleaned
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl FtsStrategy {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn can_handle(&self, query: &FtsQuery) -> bool {
        !query.text.trim().is_empty()
    }

    pub fn search(&self, query: &FtsQuery) -> Result<Vec<SearchResult>> {
        let limit = if query.limit == 0 { 50 } else { query.limit.min(MAX_LIMIT) };
        let match_expr = sanitize_query(&query.text);

        let mut clauses = vec!["json_extract(metadata_json, '$.namespace') = ?".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(query.namespace.clone())];

        if let Some(ref category) = query.category_primary {
            clauses.push("json_extract(metadata_json, '$.category_primary') = ?".to_string());
            params.push(Value::Text(category.clone()));
        }
        if let Some(min_importance) = query.min_importance {
            clauses.push("json_extract(metadata_json, '$.importance_score') >= ?".to_string());
            params.push(Value::Real(min_importance.score()));
        }

        let (sql, all_params) = if let Some(match_expr) = match_expr {
            clauses.insert(0, "memory_fts MATCH ?".to_string());
            params.insert(0, Value::Text(match_expr));
            (
                format!(
                    "SELECT memory_id, content, metadata_json, bm25(memory_fts) AS rank
                     FROM memory_fts WHERE {}
                     ORDER BY rank ASC LIMIT ? OFFSET ?",
                    clauses.join(" AND ")
                ),
                params,
            )
        } else {
            (
                format!(
                    "SELECT memory_id, content, metadata_json, 0.0 AS rank
                     FROM memory_fts WHERE {}
                     ORDER BY rank ASC LIMIT ? OFFSET ?",
                    clauses.join(" AND ")
                ),
                params,
            )
        };

        let mut bound: Vec<Box<dyn ToSql>> = all_params.into_iter().map(|v| Box::new(v) as Box<dyn ToSql>).collect();
        bound.push(Box::new(limit as i64));
        bound.push(Box::new(query.offset as i64));

        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bound.iter().map(|b| b.as_ref())), |row| {
                let metadata_json: String = row.get(2)?;
                let rank: f64 = row.get(3)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, metadata_json, rank))
            })?;

            let mut results = Vec::new();
            for row in rows {
                let (id, content, metadata_json, rank) = row?;
                let metadata: serde_json::Value = serde_json::from_str(&metadata_json)?;
                let created_at = metadata
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(chrono::Utc::now);
                // BM25 returns negative scores where more-negative is better;
                // normalize into (0, 1] for the common search result shape.
                let score = 1.0 / (1.0 + rank.abs());
                results.push(SearchResult {
                    id,
                    content,
                    metadata,
                    score,
                    strategy: "fts".to_string(),
                    timestamp: created_at,
                });
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with_record(content: &str, namespace: &str) -> Arc<Storage> {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        storage
            .with_connection(|conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
                         VALUES ('m1', '{namespace}', '{content}', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')"
                    ),
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        storage
    }

    #[test]
    fn finds_matching_content_in_namespace() {
        let storage = storage_with_record("TypeScript interfaces define object structure", "default");
        let strategy = FtsStrategy::new(storage);
        let results = strategy
            .search(&FtsQuery { text: "TypeScript".into(), namespace: "default".into(), limit: 10, ..Default::default() })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[test]
    fn namespace_filter_excludes_other_namespaces() {
        let storage = storage_with_record("TypeScript interfaces define object structure", "other");
        let strategy = FtsStrategy::new(storage);
        let results = strategy
            .search(&FtsQuery { text: "TypeScript".into(), namespace: "default".into(), limit: 10, ..Default::default() })
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn limit_is_capped_at_max() {
        let storage = storage_with_record("hello world", "default");
        let strategy = FtsStrategy::new(storage);
        let results = strategy
            .search(&FtsQuery { text: "hello".into(), namespace: "default".into(), limit: 5000, ..Default::default() })
            .unwrap();
        assert!(results.len() <= MAX_LIMIT);
    }
}
