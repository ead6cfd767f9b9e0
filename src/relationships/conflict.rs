//! Relationship conflict detection and resolution (§4.4).

use std::collections::HashMap;

use crate::types::{Relationship, RelationshipType};

#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub target_memory_id: String,
    pub reason: String,
    pub conflicting: Vec<Relationship>,
}

fn weighted_score(r: &Relationship) -> f64 {
    0.6 * r.confidence + 0.4 * r.strength
}

/// Group `relationships` by target and flag groups with contradictory
/// types, more than one SUPERSEDES, or a confidence spread exceeding
/// `confidence_variance` (`ConsolidationConfig::conflict_confidence_variance`).
pub fn detect(relationships: &[Relationship], confidence_variance: f64) -> Vec<ConflictReport> {
    let mut by_target: HashMap<&str, Vec<&Relationship>> = HashMap::new();
    for r in relationships {
        by_target.entry(r.target_memory_id.as_str()).or_default().push(r);
    }

    let mut reports = Vec::new();
    for (target, group) in by_target {
        if group.len() < 2 {
            continue;
        }
        let has_contradiction = group.iter().any(|r| r.relationship_type == RelationshipType::Contradiction);
        let has_continuation = group.iter().any(|r| r.relationship_type == RelationshipType::Continuation);
        let supersedes_count = group.iter().filter(|r| r.relationship_type == RelationshipType::Supersedes).count();
        let max_conf = group.iter().map(|r| r.confidence).fold(f64::MIN, f64::max);
        let min_conf = group.iter().map(|r| r.confidence).fold(f64::MAX, f64::min);

        let reason = if has_contradiction && has_continuation {
            Some("contradictory CONTRADICTION and CONTINUATION edges to the same target".to_string())
        } else if supersedes_count > 1 {
            Some(format!("{supersedes_count} SUPERSEDES edges to the same target"))
        } else if max_conf - min_conf > confidence_variance {
            Some(format!("confidence spread {:.2} exceeds {confidence_variance:.2}", max_conf - min_conf))
        } else {
            None
        };

        if let Some(reason) = reason {
            reports.push(ConflictReport {
                target_memory_id: target.to_string(),
                reason,
                conflicting: group.into_iter().cloned().collect(),
            });
        }
    }
    reports
}

/// Resolve every reported conflict by keeping the top two edges per target
/// (by `0.6*confidence + 0.4*strength`) and dropping the rest. Targets with
/// no conflict are left untouched.
pub fn resolve(relationships: &[Relationship], conflicts: &[ConflictReport]) -> Vec<Relationship> {
    let conflicted_targets: std::collections::HashSet<&str> =
        conflicts.iter().map(|c| c.target_memory_id.as_str()).collect();

    let mut kept: Vec<Relationship> = relationships
        .iter()
        .filter(|r| !conflicted_targets.contains(r.target_memory_id.as_str()))
        .cloned()
        .collect();

    for conflict in conflicts {
        let mut group = conflict.conflicting.clone();
        group.sort_by(|a, b| weighted_score(b).partial_cmp(&weighted_score(a)).unwrap());
        group.truncate(2);
        kept.extend(group);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(rtype: RelationshipType, target: &str, confidence: f64, strength: f64) -> Relationship {
        Relationship {
            relationship_type: rtype,
            target_memory_id: target.into(),
            confidence,
            strength,
            reason: "reason enough".into(),
            context: "context".into(),
            entities: vec![],
        }
    }

    #[test]
    fn flags_contradictory_types_to_same_target() {
        let rels = vec![
            rel(RelationshipType::Contradiction, "t1", 0.6, 0.5),
            rel(RelationshipType::Continuation, "t1", 0.7, 0.6),
        ];
        let conflicts = detect(&rels, 0.5);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].target_memory_id, "t1");
    }

    #[test]
    fn flags_multiple_supersedes() {
        let rels = vec![
            rel(RelationshipType::Supersedes, "t1", 0.6, 0.5),
            rel(RelationshipType::Supersedes, "t1", 0.7, 0.6),
        ];
        assert_eq!(detect(&rels, 0.5).len(), 1);
    }

    #[test]
    fn no_conflict_when_single_edge_per_target() {
        let rels = vec![rel(RelationshipType::Related, "t1", 0.6, 0.5)];
        assert!(detect(&rels, 0.5).is_empty());
    }

    #[test]
    fn resolve_keeps_top_two_by_weighted_score() {
        let rels = vec![
            rel(RelationshipType::Supersedes, "t1", 0.9, 0.9),
            rel(RelationshipType::Supersedes, "t1", 0.8, 0.8),
            rel(RelationshipType::Supersedes, "t1", 0.5, 0.5),
        ];
        let conflicts = detect(&rels, 0.5);
        let resolved = resolve(&rels, &conflicts);
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|r| r.confidence >= 0.8));
    }
}
