//! Relationship network traversal (§4.4): BFS from a memory id, avoiding
//! cycles by tracking visited ids along the path.

use std::collections::{HashSet, VecDeque};

use crate::types::Relationship;

#[derive(Debug, Clone, serde::Serialize)]
pub struct NetworkEntry {
    pub memory_id: String,
    pub relationship: Relationship,
    pub direction: Direction,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NetworkStats {
    pub total: usize,
    pub max_depth: usize,
    pub unique_types: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Network {
    pub memory_id: String,
    pub entries: Vec<NetworkEntry>,
    pub stats: NetworkStats,
}

/// `outgoing`/`incoming` are adjacency maps from a record id to its edges
/// in that direction, already namespace-scoped by the caller.
pub fn traverse(
    root: &str,
    max_depth: usize,
    outgoing: &std::collections::HashMap<String, Vec<Relationship>>,
    incoming: &std::collections::HashMap<String, Vec<Relationship>>,
) -> Network {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(root.to_string());
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((root.to_string(), 0));

    let mut entries = Vec::new();
    let mut unique_types = HashSet::new();
    let mut reached_depth = 0usize;

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        if let Some(edges) = outgoing.get(&current) {
            for edge in edges {
                if visited.contains(&edge.target_memory_id) {
                    continue;
                }
                unique_types.insert(edge.relationship_type.as_str().to_string());
                reached_depth = reached_depth.max(depth + 1);
                entries.push(NetworkEntry {
                    memory_id: edge.target_memory_id.clone(),
                    relationship: edge.clone(),
                    direction: Direction::Outgoing,
                    depth: depth + 1,
                });
                visited.insert(edge.target_memory_id.clone());
                queue.push_back((edge.target_memory_id.clone(), depth + 1));
            }
        }
        if let Some(edges) = incoming.get(&current) {
            for edge in edges {
                if visited.contains(&edge.target_memory_id) {
                    continue;
                }
                unique_types.insert(edge.relationship_type.as_str().to_string());
                reached_depth = reached_depth.max(depth + 1);
                entries.push(NetworkEntry {
                    memory_id: edge.target_memory_id.clone(),
                    relationship: edge.clone(),
                    direction: Direction::Incoming,
                    depth: depth + 1,
                });
                visited.insert(edge.target_memory_id.clone());
                queue.push_back((edge.target_memory_id.clone(), depth + 1));
            }
        }
    }

    let total = entries.len();
    Network {
        memory_id: root.to_string(),
        entries,
        stats: NetworkStats {
            total,
            max_depth: reached_depth,
            unique_types: unique_types.into_iter().collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationshipType;
    use std::collections::HashMap;

    fn rel(target: &str, rtype: RelationshipType) -> Relationship {
        Relationship {
            relationship_type: rtype,
            target_memory_id: target.into(),
            confidence: 0.6,
            strength: 0.6,
            reason: "reason enough".into(),
            context: "context".into(),
            entities: vec![],
        }
    }

    #[test]
    fn bfs_avoids_cycles() {
        let mut outgoing = HashMap::new();
        outgoing.insert("a".to_string(), vec![rel("b", RelationshipType::Related)]);
        outgoing.insert("b".to_string(), vec![rel("a", RelationshipType::Related)]);
        let incoming = HashMap::new();

        let network = traverse("a", 5, &outgoing, &incoming);
        assert_eq!(network.entries.len(), 1);
        assert_eq!(network.entries[0].memory_id, "b");
    }

    #[test]
    fn respects_max_depth() {
        let mut outgoing = HashMap::new();
        outgoing.insert("a".to_string(), vec![rel("b", RelationshipType::Related)]);
        outgoing.insert("b".to_string(), vec![rel("c", RelationshipType::Related)]);
        let incoming = HashMap::new();

        let network = traverse("a", 1, &outgoing, &incoming);
        assert_eq!(network.entries.len(), 1);
        assert_eq!(network.stats.max_depth, 1);
    }
}
