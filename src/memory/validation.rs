//! Record-level validation (§4.3): the checks `store` and `update` must
//! pass before anything touches the database.

use crate::error::{MemoryError, Result};
use crate::types::MemoryRecord;

pub fn validate_record(record: &MemoryRecord, max_content_length: usize) -> Result<()> {
    if record.content.trim().is_empty() {
        return Err(MemoryError::Validation("content must not be empty".into()));
    }
    if record.content.len() > max_content_length {
        return Err(MemoryError::Validation(format!(
            "content length {} exceeds maxContentLength {}",
            record.content.len(),
            max_content_length
        )));
    }
    if !(0.0..=1.0).contains(&record.confidence_score) {
        return Err(MemoryError::Validation(format!(
            "confidenceScore {} out of range [0,1]",
            record.confidence_score
        )));
    }
    for relationship in record.all_relationships() {
        relationship.validate().map_err(MemoryError::Validation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, Importance};
    use chrono::Utc;

    fn record(content: &str, confidence: f64) -> MemoryRecord {
        MemoryRecord {
            id: "m1".into(),
            namespace: "default".into(),
            content: content.into(),
            summary: String::new(),
            classification: Classification::Conversational,
            importance: Importance::Medium,
            topic: None,
            entities: vec![],
            keywords: vec![],
            confidence_score: confidence,
            classification_reason: "reason enough".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            extraction_timestamp: Utc::now(),
            relationships: vec![],
            supersedes: vec![],
            conscious_processed: false,
            consolidation: None,
        }
    }

    #[test]
    fn rejects_empty_content() {
        assert!(validate_record(&record("", 0.5), 100).is_err());
    }

    #[test]
    fn rejects_content_over_limit() {
        assert!(validate_record(&record("hello world", 0.5), 5).is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        assert!(validate_record(&record("hello", 1.5), 100).is_err());
    }

    #[test]
    fn accepts_well_formed_record() {
        assert!(validate_record(&record("hello there", 0.8), 100).is_ok());
    }
}
