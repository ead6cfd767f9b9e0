//! Bidirectional consistency check for RELATED edges (§4.4, §1.2
//! supplement): a RELATED edge from A→B should have a reciprocal B→A.
//! Validation only reports gaps; it never auto-creates the missing edge.

use std::collections::HashMap;

use crate::types::{Relationship, RelationshipType};

#[derive(Debug, Clone, serde::Serialize)]
pub struct MissingReciprocal {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConsistencyReport {
    pub checked_edges: usize,
    pub missing_reciprocals: Vec<MissingReciprocal>,
}

/// `edges` maps a record id to its outgoing general relationships (not
/// SUPERSEDES, which is not expected to be reciprocal).
pub fn check(edges: &HashMap<String, Vec<Relationship>>) -> ConsistencyReport {
    let mut checked = 0usize;
    let mut missing = Vec::new();

    for (from, relationships) in edges {
        for relationship in relationships {
            if relationship.relationship_type != RelationshipType::Related {
                continue;
            }
            checked += 1;
            let to = &relationship.target_memory_id;
            let has_reciprocal = edges
                .get(to)
                .map(|back_edges| {
                    back_edges.iter().any(|r| {
                        r.relationship_type == RelationshipType::Related && &r.target_memory_id == from
                    })
                })
                .unwrap_or(false);
            if !has_reciprocal {
                missing.push(MissingReciprocal { from: from.clone(), to: to.clone() });
            }
        }
    }

    ConsistencyReport { checked_edges: checked, missing_reciprocals: missing }
}
