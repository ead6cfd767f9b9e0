//! Property-based tests for the consolidation similarity scorer.

use proptest::prelude::*;
use proptest::string::string_regex;

use continuity::consolidation::similarity::{content_similarity, score};

fn words() -> impl Strategy<Value = String> {
    string_regex("[a-z]{2,8}( [a-z]{2,8}){0,12}").unwrap()
}

proptest! {
    #[test]
    fn content_similarity_is_symmetric(a in words(), b in words()) {
        let ab = content_similarity(&a, &b);
        let ba = content_similarity(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn content_similarity_is_bounded(a in words(), b in words()) {
        let value = content_similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn identical_content_has_base_similarity_one(a in words()) {
        prop_assume!(!a.trim().is_empty());
        let value = content_similarity(&a, &a);
        prop_assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_confidence_is_bounded(a in words(), b in words()) {
        let result = score(&a, &b);
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        prop_assert!((0.0..=1.0).contains(&result.base_similarity));
    }
}
