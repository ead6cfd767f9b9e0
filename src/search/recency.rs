//! Recency / temporal search strategy (§4.6): exponential time-decay
//! scoring with a freshness boost and relative-date/age filter parsing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::store::Storage;
use crate::types::SearchResult;

const DEFAULT_HALF_LIFE_DAYS: f64 = 7.0;
const MIN_SCORE: f64 = 0.05;
const MAX_SCORE: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct TemporalFilter {
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct RecencyQuery {
    pub text: String,
    pub namespace: String,
    pub temporal: TemporalFilter,
    pub limit: usize,
}

pub struct RecencyStrategy {
    storage: Arc<Storage>,
}

static RELATIVE_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(second|minute|hour|day|week|month|year)s?\s*ago").unwrap()
});
static AGE_COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(younger|older)\s+than\s+(\d+)\s*(second|minute|hour|day|week|month|year)s?").unwrap()
});

fn unit_to_duration(count: i64, unit: &str) -> Duration {
    match unit.to_lowercase().as_str() {
        "second" => Duration::seconds(count),
        "minute" => Duration::minutes(count),
        "hour" => Duration::hours(count),
        "day" => Duration::days(count),
        "week" => Duration::weeks(count),
        "month" => Duration::days(count * 30),
        "year" => Duration::days(count * 365),
        _ => Duration::zero(),
    }
}

/// Parse relative temporal language ("3 days ago", "older than 2 weeks")
/// into a concrete filter, anchored at `now`.
pub fn parse_temporal_expression(text: &str, now: DateTime<Utc>) -> TemporalFilter {
    if let Some(caps) = RELATIVE_AGO.captures(text) {
        let count: i64 = caps[1].parse().unwrap_or(0);
        let duration = unit_to_duration(count, &caps[2]);
        let anchor = now - duration;
        return TemporalFilter { created_after: Some(anchor - Duration::hours(1)), created_before: Some(anchor + Duration::hours(1)) };
    }
    if let Some(caps) = AGE_COMPARISON.captures(text) {
        let direction = caps[1].to_lowercase();
        let count: i64 = caps[2].parse().unwrap_or(0);
        let duration = unit_to_duration(count, &caps[3]);
        let threshold = now - duration;
        return if direction == "younger" {
            TemporalFilter { created_after: Some(threshold), created_before: None }
        } else {
            TemporalFilter { created_after: None, created_before: Some(threshold) }
        };
    }
    TemporalFilter::default()
}

fn freshness_boost(age: Duration) -> f64 {
    if age <= Duration::hours(1) {
        2.0
    } else if age <= Duration::days(1) {
        1.5
    } else if age <= Duration::weeks(1) {
        1.2
    } else {
        1.1
    }
}

fn time_relevance(age: Duration, half_life_days: f64) -> f64 {
    let age_days = age.num_seconds() as f64 / 86_400.0;
    let raw = (-std::f64::consts::LN_2 * age_days / half_life_days).exp();
    raw.clamp(MIN_SCORE, MAX_SCORE)
}

impl RecencyStrategy {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn can_handle(&self, query: &RecencyQuery) -> bool {
        query.text.trim().is_empty()
            || query.temporal.created_after.is_some()
            || query.temporal.created_before.is_some()
    }

    pub fn search(&self, query: &RecencyQuery) -> Result<Vec<SearchResult>> {
        let now = Utc::now();
        let limit = if query.limit == 0 { 50 } else { query.limit };

        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, namespace, classification, importance, created_at
                 FROM long_term_memory WHERE namespace = ?1
                 UNION ALL
                 SELECT id, content, namespace, classification, importance, created_at
                 FROM short_term_memory WHERE namespace = ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![query.namespace], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut scored = Vec::new();
            for row in rows {
                let (id, content, classification, importance, created_at_raw) = row?;
                let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now);

                if let Some(after) = query.temporal.created_after {
                    if created_at < after {
                        continue;
                    }
                }
                if let Some(before) = query.temporal.created_before {
                    if created_at > before {
                        continue;
                    }
                }

                let age = now - created_at;
                let relevance = time_relevance(age, DEFAULT_HALF_LIFE_DAYS);
                let score = (relevance * freshness_boost(age)).clamp(0.0, 1.0);
                let importance_parsed: crate::types::Importance = importance.parse().unwrap_or(crate::types::Importance::Medium);

                scored.push((
                    SearchResult {
                        id,
                        content,
                        metadata: serde_json::json!({ "classification": classification, "namespace": query.namespace }),
                        score,
                        strategy: "recency".to_string(),
                        timestamp: created_at,
                    },
                    relevance,
                    importance_parsed.score(),
                ));
            }

            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap()
                    .then(b.2.partial_cmp(&a.2).unwrap())
                    .then(b.0.timestamp.cmp(&a.0.timestamp))
            });
            scored.truncate(limit);
            Ok(scored.into_iter().map(|(result, _, _)| result).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_ago_expression_parses() {
        let now = Utc::now();
        let filter = parse_temporal_expression("3 days ago", now);
        assert!(filter.created_after.is_some());
        assert!(filter.created_before.is_some());
    }

    #[test]
    fn older_than_expression_sets_before_only() {
        let now = Utc::now();
        let filter = parse_temporal_expression("older than 2 weeks", now);
        assert!(filter.created_before.is_some());
        assert!(filter.created_after.is_none());
    }

    #[test]
    fn younger_than_expression_sets_after_only() {
        let now = Utc::now();
        let filter = parse_temporal_expression("younger than 5 days", now);
        assert!(filter.created_after.is_some());
        assert!(filter.created_before.is_none());
    }

    #[test]
    fn fresh_record_scores_higher_than_old_record() {
        let now = Utc::now();
        let fresh = time_relevance(Duration::hours(1), DEFAULT_HALF_LIFE_DAYS);
        let old = time_relevance(Duration::days(30), DEFAULT_HALF_LIFE_DAYS);
        assert!(fresh > old);
        let _ = now;
    }

    #[test]
    fn can_handle_empty_text_query() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let strategy = RecencyStrategy::new(storage);
        assert!(strategy.can_handle(&RecencyQuery::default()));
    }
}
