//! Search & Index Layer (§4.5, §4.6, components E and F): the FTS index
//! manager plus the two query strategies layered on top of it.

pub mod filter;
pub mod fts;
pub mod index;
pub mod recency;

use std::sync::Arc;

use crate::error::Result;
use crate::store::Storage;
use crate::types::SearchResult;

pub use fts::{FtsQuery, FtsStrategy};
pub use index::{FtsIndexManager, IndexHealth, OptimizeKind};
pub use recency::{RecencyQuery, RecencyStrategy, TemporalFilter};

/// A search request broad enough to feed either strategy; the facade
/// picks the first strategy whose `can_handle` returns true, FTS before
/// recency, matching §4.6's ordering for mixed text+temporal queries.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub namespace: String,
    pub category_primary: Option<String>,
    pub min_importance: Option<crate::types::Importance>,
    pub temporal: TemporalFilter,
    pub limit: usize,
    pub offset: usize,
}

pub struct SearchRouter {
    fts: FtsStrategy,
    recency: RecencyStrategy,
}

impl SearchRouter {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { fts: FtsStrategy::new(storage.clone()), recency: RecencyStrategy::new(storage) }
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let fts_query = FtsQuery {
            text: query.text.clone(),
            namespace: query.namespace.clone(),
            category_primary: query.category_primary.clone(),
            min_importance: query.min_importance,
            limit: query.limit,
            offset: query.offset,
        };
        if self.fts.can_handle(&fts_query) {
            return self.fts.search(&fts_query);
        }

        let recency_query = RecencyQuery {
            text: query.text.clone(),
            namespace: query.namespace.clone(),
            temporal: query.temporal.clone(),
            limit: query.limit,
        };
        self.recency.search(&recency_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_text_queries_to_fts() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        storage
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
                     VALUES ('m1', 'default', 'hello world', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let router = SearchRouter::new(storage);
        let results = router
            .search(&SearchQuery { text: "hello".into(), namespace: "default".into(), ..Default::default() })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy, "fts");
    }

    #[test]
    fn routes_empty_text_to_recency() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        storage
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
                     VALUES ('m1', 'default', 'hello world', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let router = SearchRouter::new(storage);
        let results = router
            .search(&SearchQuery { namespace: "default".into(), ..Default::default() })
            .unwrap();
        assert_eq!(results[0].strategy, "recency");
    }
}
