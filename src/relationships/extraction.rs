//! Deterministic, text-only relationship extraction (§4.4, §4.4.1).
//!
//! Mirrors the teacher's `entity_extraction` module: lazily compiled
//! literal phrase tables checked by substring match, no model call
//! required. The LLM extraction path (when a [`crate::provider::ModelProvider`]
//! is configured) is additive and optional — this path always runs.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::types::{MemoryRecord, Relationship, RelationshipType};

pub static CONTINUATION_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "building on",
        "following up",
        "continuing",
        "as we discussed",
        "going back to",
        "to continue",
        "picking up where",
    ]
});

pub static REFERENCE_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "as mentioned",
        "like i said",
        "you mentioned",
        "referring to",
        "per our",
        "regarding",
        "about that",
    ]
});

pub static CONTRADICTION_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "actually",
        "on second thought",
        "i was wrong",
        "that's not right",
        "instead of",
        "correction",
        "scratch that",
    ]
});

pub static TEMPORAL_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "yesterday",
        "last time",
        "earlier",
        "before",
        "previously",
        "last week",
        "a few days ago",
        "this morning",
    ]
});

const MIN_CONFIDENCE: f64 = 0.3;
const CANDIDATE_WINDOW: usize = 50;

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| haystack.contains(phrase))
}

pub(crate) fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn entity_overlap_ratio(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_set: HashSet<_> = a.iter().map(|s| s.to_lowercase()).collect();
    let b_set: HashSet<_> = b.iter().map(|s| s.to_lowercase()).collect();
    let overlap = a_set.intersection(&b_set).count() as f64;
    overlap / a_set.len().max(b_set.len()) as f64
}

fn topic_phrase_match(new_topic: &Option<String>, candidate_topic: &Option<String>) -> f64 {
    match (new_topic, candidate_topic) {
        (Some(a), Some(b)) if !a.is_empty() && a.to_lowercase() == b.to_lowercase() => 1.0,
        (Some(a), Some(b)) if a.to_lowercase().contains(&b.to_lowercase()) || b.to_lowercase().contains(&a.to_lowercase()) => 0.5,
        _ => 0.0,
    }
}

/// One deterministically classified candidate relationship, not yet
/// filtered by [`MIN_CONFIDENCE`].
struct ScoredCandidate {
    relationship_type: RelationshipType,
    target_id: String,
    strength: f64,
    confidence: f64,
    text_similarity: f64,
    entity_overlap: f64,
}

/// Extract candidate relationships from `new_record` against `candidates`
/// (recent records in namespace, most-recent-first, already bounded to
/// [`CANDIDATE_WINDOW`] by the caller).
pub fn extract(new_record: &MemoryRecord, candidates: &[MemoryRecord]) -> Vec<Relationship> {
    let new_tokens = tokens(&new_record.content);
    let new_content_lower = new_record.content.to_lowercase();
    let has_continuation_phrase = contains_any(&new_content_lower, &CONTINUATION_PHRASES);
    let has_reference_phrase = contains_any(&new_content_lower, &REFERENCE_PHRASES);
    let has_contradiction_phrase = contains_any(&new_content_lower, &CONTRADICTION_PHRASES);
    let has_temporal_phrase = contains_any(&new_content_lower, &TEMPORAL_PHRASES);

    let mut scored = Vec::new();

    for candidate in candidates.iter().take(CANDIDATE_WINDOW) {
        if candidate.id == new_record.id {
            continue;
        }
        let candidate_tokens = tokens(&candidate.content);
        let content_similarity = jaccard(&new_tokens, &candidate_tokens);
        let entity_overlap = entity_overlap_ratio(&new_record.entities, &candidate.entities);
        let topic_overlap = 0.7 * topic_phrase_match(&new_record.topic, &candidate.topic) + 0.3 * entity_overlap;

        let qualifies = content_similarity > 0.6 || topic_overlap > 0.4 || has_temporal_phrase;
        if !qualifies {
            continue;
        }

        let relationship_type = if has_continuation_phrase || content_similarity > 0.3 {
            RelationshipType::Continuation
        } else if has_reference_phrase && content_similarity > 0.15 {
            RelationshipType::Reference
        } else if content_similarity > 0.30 && !has_reference_phrase {
            RelationshipType::Reference
        } else if topic_overlap > 0.5 {
            RelationshipType::Related
        } else if has_contradiction_phrase && content_similarity > 0.4 {
            RelationshipType::Contradiction
        } else {
            continue;
        };

        let age_days = (new_record.created_at - candidate.created_at).num_seconds() as f64 / 86_400.0;
        let temporal_factor = (1.0 - age_days.abs() / 30.0).max(0.1);
        let entity_factor = (2.0 * entity_overlap).min(1.0);
        let semantic_factor = content_similarity;

        let strength = (0.4 * content_similarity.max(topic_overlap)
            + 0.3 * temporal_factor
            + 0.2 * entity_factor
            + 0.1 * semantic_factor)
            .clamp(0.0, 1.0);
        let confidence = (0.4 * topic_overlap.max(content_similarity)
            + 0.3 * temporal_factor
            + 0.2 * entity_factor
            + 0.1 * semantic_factor
            + 0.05)
            .clamp(0.0, 1.0);

        scored.push(ScoredCandidate {
            relationship_type,
            target_id: candidate.id.clone(),
            strength,
            confidence,
            text_similarity: content_similarity,
            entity_overlap,
        });
    }

    scored
        .into_iter()
        .filter(|c| c.confidence >= MIN_CONFIDENCE)
        .map(|c| Relationship {
            relationship_type: c.relationship_type,
            target_memory_id: c.target_id,
            confidence: c.confidence,
            strength: c.strength.min(c.confidence + 0.3),
            reason: format!(
                "{} classified by deterministic extraction (similarity={:.2})",
                c.relationship_type.as_str(),
                c.text_similarity
            ),
            context: format!("entity overlap {:.2}", c.entity_overlap),
            entities: vec![],
        })
        .collect()
}
