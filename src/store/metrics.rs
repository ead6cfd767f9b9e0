//! In-process operation metrics (§4.1): a bounded ring buffer of recent
//! operation timings plus running aggregates, mirroring the teacher's
//! performance tracker but scoped to this crate's store operations.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::PerformanceConfig;

#[derive(Debug, Clone)]
pub struct SlowQuery {
    pub operation: String,
    pub duration_ms: u64,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl OperationStats {
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }

    fn record(&mut self, duration_ms: u64) {
        self.count += 1;
        self.total_ms += duration_ms;
        self.min_ms = if self.count == 1 {
            duration_ms
        } else {
            self.min_ms.min(duration_ms)
        };
        self.max_ms = self.max_ms.max(duration_ms);
    }
}

struct Inner {
    by_operation: std::collections::HashMap<String, OperationStats>,
    slow_queries: VecDeque<SlowQuery>,
}

/// Tracks per-operation latency for the Store Context. Cheap to share: all
/// mutation happens under a single `parking_lot::Mutex`, matching the
/// teacher's preference for lock-protected plain structs over atomics when
/// the protected state has more than one field that must move together.
pub struct Metrics {
    config: PerformanceConfig,
    inner: Mutex<Inner>,
}

impl Metrics {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                by_operation: std::collections::HashMap::new(),
                slow_queries: VecDeque::new(),
            }),
        }
    }

    /// Record one completed operation. A no-op when metrics are disabled in
    /// configuration, so callers can unconditionally wrap every store call.
    pub fn record(&self, operation: &str, duration: Duration) {
        if !self.config.enabled {
            return;
        }
        let duration_ms = duration.as_millis() as u64;
        let mut inner = self.inner.lock();
        inner
            .by_operation
            .entry(operation.to_string())
            .or_default()
            .record(duration_ms);

        if duration_ms >= self.config.slow_query_threshold_ms {
            if inner.slow_queries.len() >= self.config.max_slow_query_history {
                inner.slow_queries.pop_front();
            }
            inner.slow_queries.push_back(SlowQuery {
                operation: operation.to_string(),
                duration_ms,
                recorded_at: chrono::Utc::now(),
            });
        }
    }

    pub fn snapshot(&self) -> std::collections::HashMap<String, OperationStats> {
        self.inner.lock().by_operation.clone()
    }

    pub fn slow_queries(&self) -> Vec<SlowQuery> {
        self.inner.lock().slow_queries.iter().cloned().collect()
    }

    pub fn total_operations(&self) -> u64 {
        self.inner.lock().by_operation.values().map(|s| s.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_aggregates_latency() {
        let metrics = Metrics::new(PerformanceConfig::default());
        metrics.record("store", Duration::from_millis(10));
        metrics.record("store", Duration::from_millis(20));
        let snapshot = metrics.snapshot();
        let stats = snapshot.get("store").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.avg_ms(), 15.0);
        assert_eq!(stats.min_ms, 10);
        assert_eq!(stats.max_ms, 20);
    }

    #[test]
    fn slow_queries_respect_threshold_and_cap() {
        let mut config = PerformanceConfig::default();
        config.slow_query_threshold_ms = 5;
        config.max_slow_query_history = 2;
        let metrics = Metrics::new(config);
        metrics.record("search", Duration::from_millis(1));
        metrics.record("search", Duration::from_millis(50));
        metrics.record("search", Duration::from_millis(60));
        metrics.record("search", Duration::from_millis(70));
        let slow = metrics.slow_queries();
        assert_eq!(slow.len(), 2);
        assert_eq!(slow[0].duration_ms, 60);
        assert_eq!(slow[1].duration_ms, 70);
    }

    #[test]
    fn disabled_config_skips_recording() {
        let mut config = PerformanceConfig::default();
        config.enabled = false;
        let metrics = Metrics::new(config);
        metrics.record("store", Duration::from_millis(1000));
        assert_eq!(metrics.total_operations(), 0);
    }
}
