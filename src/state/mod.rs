//! State Manager (§4.2, component B): per-record lifecycle, validated
//! transitions, bounded history, retry with backoff, and metrics.

pub mod suggest;
pub mod transitions;

use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::StateManagerConfig;
use crate::error::{MemoryError, Result};
use crate::store::Storage;
use crate::types::{MemoryState, StateTransition};

const RECORD_TABLES: [&str; 2] = ["short_term_memory", "long_term_memory"];

#[derive(Debug, Default, serde::Serialize)]
pub struct StateMetrics {
    pub by_state: std::collections::HashMap<String, u64>,
    pub by_transition: std::collections::HashMap<String, u64>,
    pub total_transitions: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub delay_ms: u64,
}

/// Tracks and validates the lifecycle of every memory record. Built on top
/// of [`Storage`] rather than an in-process map: the authoritative state
/// lives in the `state` column of whichever record table currently holds
/// the row, so there is nothing to keep in sync across instances (§5.2
/// "Shared resources").
pub struct StateManager {
    storage: Arc<Storage>,
    config: StateManagerConfig,
}

struct Location {
    table: &'static str,
    state: MemoryState,
    namespace: String,
}

impl StateManager {
    pub fn new(storage: Arc<Storage>, config: StateManagerConfig) -> Self {
        Self { storage, config }
    }

    fn locate(&self, id: &str) -> Result<Location> {
        self.storage.with_connection(|conn| {
            for table in RECORD_TABLES {
                let row: Option<(String, String)> = conn
                    .query_row(
                        &format!("SELECT state, namespace FROM {table} WHERE id = ?1"),
                        params![id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .ok();
                if let Some((state, namespace)) = row {
                    let state: MemoryState = state
                        .parse()
                        .map_err(|_| MemoryError::Internal(format!("corrupt state value for {id}")))?;
                    return Ok(Location { table, state, namespace });
                }
            }
            Err(MemoryError::NotFound(format!("memory record {id}")))
        })
    }

    /// Force the current state of an existing row, bypassing transition
    /// validation. Used by the Memory Manager immediately after insert.
    pub fn initialize(&self, id: &str, state: MemoryState) -> Result<()> {
        let location = self.locate(id)?;
        self.storage.with_connection(|conn| {
            conn.execute(
                &format!("UPDATE {} SET state = ?1 WHERE id = ?2", location.table),
                params![state.as_str(), id],
            )?;
            Ok(())
        })
    }

    pub fn current(&self, id: &str) -> Result<MemoryState> {
        Ok(self.locate(id)?.state)
    }

    pub fn can_transition_to(&self, id: &str, target: MemoryState) -> Result<bool> {
        Ok(self.validate_transition(id, target).is_ok())
    }

    /// Check `(current, target)` against [`transitions::VALID_TRANSITIONS`],
    /// returning a suggestion when it fails.
    pub fn validate_transition(&self, id: &str, target: MemoryState) -> Result<()> {
        let current = self.current(id)?;
        if current == target || transitions::is_valid(current, target) {
            return Ok(());
        }
        let suggestion = suggest::suggest(current, target).map(|s| s.as_str().to_string());
        Err(MemoryError::invalid_transition(
            current.as_str(),
            target.as_str(),
            suggestion,
        ))
    }

    /// Apply a validated transition: write one history row, move the
    /// record between `short_term_memory`/`long_term_memory` when crossing
    /// the PROCESSED → CONSCIOUS_PENDING boundary (§4.1.1), and bump
    /// per-state/per-transition counters.
    #[instrument(skip(self, metadata), fields(memory_id = %id))]
    pub fn transition(
        &self,
        id: &str,
        target: MemoryState,
        reason: Option<String>,
        metadata: Option<serde_json::Value>,
        agent_id: Option<String>,
    ) -> Result<StateTransition> {
        let location = self.locate(id)?;
        let from = location.state;

        if from == target {
            warn!(memory_id = %id, state = %from, "self-transition requested");
        } else if !transitions::is_valid(from, target) {
            let suggestion = suggest::suggest(from, target).map(|s| s.as_str().to_string());
            return Err(MemoryError::invalid_transition(
                from.as_str(),
                target.as_str(),
                suggestion,
            ));
        }

        let started = std::time::Instant::now();
        let row = StateTransition {
            id: Uuid::new_v4().to_string(),
            memory_id: id.to_string(),
            from_state: from,
            to_state: target,
            timestamp: chrono::Utc::now(),
            reason,
            metadata,
            agent_id,
            error_message: None,
            processing_time_ms: None,
        };

        self.storage.with_transaction(|conn| {
            self.migrate_table_if_needed(conn, id, &location, from, target)?;
            conn.execute(
                &format!("UPDATE {} SET state = ?1, updated_at = ?2 WHERE id = ?3",
                    if crosses_to_long_term(from, target) { "long_term_memory" } else { location.table }),
                params![target.as_str(), chrono::Utc::now().to_rfc3339(), id],
            )?;
            self.evict_if_over_cap(conn, id)?;
            conn.execute(
                "INSERT INTO state_transitions (id, memory_id, from_state, to_state, timestamp, reason, metadata, agent_id, error_message, processing_time_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.id,
                    row.memory_id,
                    row.from_state.as_str(),
                    row.to_state.as_str(),
                    row.timestamp.to_rfc3339(),
                    row.reason,
                    row.metadata.as_ref().map(|m| m.to_string()),
                    row.agent_id,
                    row.error_message,
                    started.elapsed().as_millis() as i64,
                ],
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    fn migrate_table_if_needed(
        &self,
        conn: &rusqlite::Connection,
        id: &str,
        location: &Location,
        from: MemoryState,
        target: MemoryState,
    ) -> Result<()> {
        if !crosses_to_long_term(from, target) || location.table == "long_term_memory" {
            return Ok(());
        }
        conn.execute(
            "INSERT INTO long_term_memory SELECT * FROM short_term_memory WHERE id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM short_term_memory WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn evict_if_over_cap(&self, conn: &rusqlite::Connection, id: &str) -> Result<()> {
        if !self.config.enable_history_tracking {
            return Ok(());
        }
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM state_transitions WHERE memory_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let max = self.config.max_history_entries as i64;
        if count >= max {
            conn.execute(
                "DELETE FROM state_transitions WHERE id IN (
                    SELECT id FROM state_transitions WHERE memory_id = ?1
                    ORDER BY timestamp ASC LIMIT ?2
                )",
                params![id, count - max + 1],
            )?;
        }
        Ok(())
    }

    pub fn history(&self, id: &str) -> Result<Vec<StateTransition>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, memory_id, from_state, to_state, timestamp, reason, metadata, agent_id, error_message, processing_time_ms
                 FROM state_transitions WHERE memory_id = ?1 ORDER BY timestamp ASC",
            )?;
            let rows = stmt
                .query_map(params![id], |row| {
                    let metadata: Option<String> = row.get(6)?;
                    let timestamp: String = row.get(4)?;
                    Ok(StateTransition {
                        id: row.get(0)?,
                        memory_id: row.get(1)?,
                        from_state: row.get::<_, String>(2)?.parse().unwrap_or(MemoryState::Failed),
                        to_state: row.get::<_, String>(3)?.parse().unwrap_or(MemoryState::Failed),
                        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                            .map(|dt| dt.with_timezone(&chrono::Utc))
                            .unwrap_or_else(|_| chrono::Utc::now()),
                        reason: row.get(5)?,
                        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                        agent_id: row.get(7)?,
                        error_message: row.get(8)?,
                        processing_time_ms: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn by_state(&self, state: MemoryState) -> Result<Vec<String>> {
        self.storage.with_connection(|conn| {
            let mut ids = Vec::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE state = ?1"))?;
                let found = stmt.query_map(params![state.as_str()], |row| row.get::<_, String>(0))?;
                for id in found {
                    ids.push(id?);
                }
            }
            Ok(ids)
        })
    }

    pub fn metrics(&self) -> Result<StateMetrics> {
        self.storage.with_connection(|conn| {
            let mut by_state = std::collections::HashMap::new();
            for table in RECORD_TABLES {
                let mut stmt = conn.prepare(&format!("SELECT state, COUNT(*) FROM {table} GROUP BY state"))?;
                let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
                for row in rows {
                    let (state, count) = row?;
                    *by_state.entry(state).or_insert(0u64) += count as u64;
                }
            }

            let mut by_transition = std::collections::HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT from_state, to_state, COUNT(*) FROM state_transitions GROUP BY from_state, to_state",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?;
            let mut total = 0u64;
            for row in rows {
                let (from, to, count) = row?;
                total += count as u64;
                by_transition.insert(format!("{from}_TO_{to}"), count as u64);
            }

            Ok(StateMetrics {
                by_state,
                by_transition,
                total_transitions: total,
            })
        })
    }

    /// Retry a transition with exponential backoff: `delay_i = delay_ms * i`.
    /// Synchronous sleep is deliberate — this manager has no async runtime
    /// dependency, matching §5.1's split between sync managers and the
    /// async facade that wraps them.
    pub fn retry(&self, id: &str, target: MemoryState, opts: RetryOptions) -> bool {
        for attempt in 1..=opts.max_retries.max(1) {
            match self.transition(id, target, Some(format!("retry attempt {attempt}")), None, None) {
                Ok(_) => return true,
                Err(e) => {
                    warn!(memory_id = %id, attempt, error = %e, "transition retry failed");
                    if attempt < opts.max_retries {
                        std::thread::sleep(Duration::from_millis(opts.delay_ms * attempt as u64));
                    }
                }
            }
        }
        false
    }

    pub fn clear(&self, id: &str) -> Result<()> {
        self.storage.with_connection(|conn| {
            conn.execute("DELETE FROM state_transitions WHERE memory_id = ?1", params![id])?;
            Ok(())
        })
    }
}

fn crosses_to_long_term(from: MemoryState, to: MemoryState) -> bool {
    from == MemoryState::Processed && to == MemoryState::ConsciousPending
}
