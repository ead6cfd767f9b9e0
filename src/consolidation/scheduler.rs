//! Interval-based consolidation sweep (§4.7 "Scheduler").
//!
//! Mirrors the teacher's `search::scheduled_reindex` task loop: a
//! `tokio::time::interval` driving a synchronous engine call through
//! `spawn_blocking`, stoppable via a `JoinHandle`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::ConsolidationEngine;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    pub max_consolidations_per_run: usize,
    pub similarity_threshold: f64,
    pub min_confidence: f64,
    pub namespace: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            max_consolidations_per_run: 20,
            similarity_threshold: 0.7,
            min_confidence: 0.8,
            namespace: "default".to_string(),
        }
    }
}

pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Spawn the periodic sweep. Each tick: skip entirely when
/// [`super::ConsolidationEngine::analytics`] reports `overall_health ==
/// "poor"`, otherwise detect candidates among the most recently touched
/// primaries (bounded by `max_consolidations_per_run`) and consolidate
/// every candidate whose confidence clears `min_confidence`.
pub fn start(engine: Arc<ConsolidationEngine>, config: SchedulerConfig) -> SchedulerHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_minutes * 60));
        loop {
            ticker.tick().await;
            let engine = engine.clone();
            let config = config.clone();
            let outcome = tokio::task::spawn_blocking(move || run_sweep(&engine, &config)).await;
            match outcome {
                Ok(Ok(count)) => info!(consolidated = count, "consolidation sweep completed"),
                Ok(Err(e)) => warn!(error = %e, "consolidation sweep failed"),
                Err(e) => warn!(error = %e, "consolidation sweep task panicked"),
            }
        }
    });
    SchedulerHandle { task }
}

fn run_sweep(engine: &ConsolidationEngine, config: &SchedulerConfig) -> crate::error::Result<usize> {
    let analytics = engine.analytics()?;
    if analytics.overall_health == "poor" {
        info!("skipping consolidation sweep: overall health is poor");
        return Ok(0);
    }

    let mut consolidated = 0;
    let primaries = engine.recent_primaries(&config.namespace, config.max_consolidations_per_run)?;
    for primary_id in primaries {
        let Some(primary_content) = engine.content_of(&primary_id)? else { continue };
        let candidates = engine.detect(&primary_content, &config.namespace, Some(config.similarity_threshold))?;
        let dup_ids: Vec<String> = candidates
            .into_iter()
            .filter(|c| c.memory_id != primary_id && c.similarity.confidence >= config.min_confidence)
            .map(|c| c.memory_id)
            .collect();
        if dup_ids.is_empty() {
            continue;
        }
        if engine.consolidate(&primary_id, &dup_ids).is_ok() {
            consolidated += 1;
        }
    }
    Ok(consolidated)
}
