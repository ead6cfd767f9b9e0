//! Duplicate-candidate confidence scoring (§4.7).

use crate::relationships::extraction::{jaccard, tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Recommendation {
    Merge,
    Replace,
    Ignore,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SimilarityScore {
    pub base_similarity: f64,
    pub confidence: f64,
    pub recommendation: Recommendation,
}

pub fn content_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokens(a), &tokens(b))
}

/// `base = similarity`, adjusted per §4.7's length-ratio/mean-length rules,
/// clamped to `[0,1]`, then bucketed into a recommendation.
pub fn score(a: &str, b: &str) -> SimilarityScore {
    let similarity = content_similarity(a, b);
    let (shorter, longer) = if a.len() <= b.len() { (a.len(), b.len()) } else { (b.len(), a.len()) };
    let length_ratio = if longer == 0 { 1.0 } else { shorter as f64 / longer as f64 };
    let mean_length = (a.len() + b.len()) as f64 / 2.0;

    let mut confidence = similarity;
    if length_ratio > 0.8 {
        confidence += 0.10;
    }
    if mean_length > 200.0 {
        confidence += 0.05;
    }
    if mean_length < 50.0 && similarity > 0.9 {
        confidence -= 0.20;
    }
    confidence = confidence.clamp(0.0, 1.0);

    let recommendation = if confidence >= 0.9 {
        Recommendation::Merge
    } else if confidence >= 0.7 {
        Recommendation::Replace
    } else {
        Recommendation::Ignore
    };

    SimilarityScore { base_similarity: similarity, confidence, recommendation }
}
