//! "Suggested state" hinting for rejected transitions (§4.2): when a
//! caller requests an invalid `(from, to)` pair, find the valid successor
//! of `from` whose name is closest to the requested `to`, by string
//! similarity, for use in the error message.

use crate::types::MemoryState;

use super::transitions::successors;

const SUGGESTION_FLOOR: f64 = 0.3;

fn similarity_ratio(a: &str, b: &str) -> f64 {
    let distance = levenshtein::levenshtein(a, b) as f64;
    let longest = a.len().max(b.len()).max(1) as f64;
    1.0 - (distance / longest)
}

/// Closest valid successor of `from` to the requested (invalid) `to`, or
/// `None` when nothing clears the similarity floor — e.g. `from` is
/// terminal and has no successors at all.
pub fn suggest(from: MemoryState, requested: MemoryState) -> Option<MemoryState> {
    successors(from)
        .into_iter()
        .map(|candidate| (candidate, similarity_ratio(candidate.as_str(), requested.as_str())))
        .filter(|(_, ratio)| *ratio >= SUGGESTION_FLOOR)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
        .map(|(candidate, _)| candidate)
}
