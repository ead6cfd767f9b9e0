//! FTS Index Manager (§4.5, component E): health scoring, optimize/repair,
//! backup/restore, and the backup catalog (§4.5.1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::params;
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::store::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum IndexHealth {
    Excellent,
    Good,
    Degraded,
    Critical,
    Corrupted,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub health: IndexHealth,
    pub row_count: i64,
    pub orphaned_rows: i64,
    pub score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub est_opt_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OptimizeKind {
    Rebuild,
    Merge,
    Compact,
    Vacuum,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OptimizeResult {
    pub kind: OptimizeKind,
    pub rows_affected: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BackupMetadata {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub row_count: i64,
    pub checksum: String,
}

/// Fletcher-32-style rolling checksum over the UTF-8 bytes of the
/// concatenated `(rowid, content, metadata_json)` tuples, in rowid order
/// (§4.5.1). Not cryptographic; only meant to catch truncation/corruption.
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0xffff;
    let mut sum2: u32 = 0xffff;
    for chunk in data.chunks(360) {
        for &byte in chunk {
            sum1 += byte as u32;
            sum2 += sum1;
        }
        sum1 %= 65535;
        sum2 %= 65535;
    }
    (sum2 << 16) | sum1
}

pub struct FtsIndexManager {
    storage: Arc<Storage>,
    is_optimizing: AtomicBool,
}

impl FtsIndexManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage, is_optimizing: AtomicBool::new(false) }
    }

    fn fts_rows(&self) -> Result<Vec<(i64, String, String, String)>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rowid, memory_id, content, metadata_json FROM memory_fts ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn health_report(&self) -> Result<HealthReport> {
        let rows = self.fts_rows()?;
        let row_count = rows.len() as i64;

        let orphaned_rows: i64 = self.storage.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM memory_fts
                 WHERE memory_id NOT IN (SELECT id FROM short_term_memory)
                   AND memory_id NOT IN (SELECT id FROM long_term_memory)",
                [],
                |row| row.get(0),
            )
            .map_err(MemoryError::from)
        })?;

        let corruption = if row_count == 0 { 0.0 } else { orphaned_rows as f64 / row_count as f64 };
        let fragmentation = 0.0; // FTS5 merges transparently; no exposed fragmentation metric to sample.
        let perf_penalty = 0.0;
        let size_penalty = if row_count > 1_000_000 { 0.1 } else { 0.0 };

        let score = (1.0 - (0.8 * corruption + 0.3 * fragmentation + perf_penalty + size_penalty)).clamp(0.0, 1.0);

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        if orphaned_rows > 0 {
            issues.push(format!("{orphaned_rows} orphaned FTS rows with no backing record"));
            recommendations.push("run REBUILD to drop orphaned rows".to_string());
        }

        let health = if corruption > 0.2 {
            IndexHealth::Corrupted
        } else if score >= 0.9 {
            IndexHealth::Excellent
        } else if score >= 0.75 {
            IndexHealth::Good
        } else if score >= 0.5 {
            IndexHealth::Degraded
        } else {
            IndexHealth::Critical
        };

        Ok(HealthReport {
            health,
            row_count,
            orphaned_rows,
            score,
            issues,
            recommendations,
            est_opt_ms: (row_count as u64 / 100).max(10),
        })
    }

    /// Mutually exclusive: a concurrent call observes `OptimizationBusy`.
    pub fn optimize(&self, kind: OptimizeKind) -> Result<OptimizeResult> {
        if self.is_optimizing.swap(true, Ordering::SeqCst) {
            return Err(MemoryError::OptimizationBusy);
        }
        let result = self.optimize_inner(kind);
        self.is_optimizing.store(false, Ordering::SeqCst);
        result
    }

    fn optimize_inner(&self, kind: OptimizeKind) -> Result<OptimizeResult> {
        let start = std::time::Instant::now();
        let rows_affected = match kind {
            OptimizeKind::Merge => self.storage.with_connection(|conn| {
                conn.execute("INSERT INTO memory_fts(memory_fts) VALUES('merge')", [])?;
                Ok(0)
            })?,
            OptimizeKind::Compact => self.storage.with_connection(|conn| {
                conn.execute("INSERT INTO memory_fts(memory_fts) VALUES('optimize')", [])?;
                Ok(0)
            })?,
            OptimizeKind::Vacuum => self.storage.with_connection(|conn| {
                conn.execute_batch("VACUUM;")?;
                Ok(0)
            })?,
            OptimizeKind::Rebuild => self.rebuild()?,
        };
        Ok(OptimizeResult { kind, rows_affected, duration_ms: start.elapsed().as_millis() as u64 })
    }

    /// Delete all FTS rows, then reinsert one per source record with
    /// non-empty content (§4.5).
    fn rebuild(&self) -> Result<i64> {
        self.storage.with_transaction(|conn| {
            conn.execute("DELETE FROM memory_fts", [])?;
            let mut inserted = 0i64;
            for table in ["short_term_memory", "long_term_memory"] {
                inserted += conn.execute(
                    &format!(
                        "INSERT INTO memory_fts(memory_id, content, metadata_json)
                         SELECT id, content, json_object(
                            'memory_type', lower(classification),
                            'category_primary', COALESCE(topic, lower(classification)),
                            'importance_score', (CASE importance
                                WHEN 'CRITICAL' THEN 0.9 WHEN 'HIGH' THEN 0.7
                                WHEN 'MEDIUM' THEN 0.5 ELSE 0.3 END),
                            'classification', classification,
                            'created_at', created_at,
                            'namespace', namespace
                         )
                         FROM {table} WHERE content != ''"
                    ),
                    [],
                )? as i64;
            }
            Ok(inserted)
        })
    }

    /// Emergency rebuild path triggered by CRITICAL health (§4.5 scheduler).
    pub fn repair(&self) -> Result<OptimizeResult> {
        self.optimize(OptimizeKind::Rebuild)
    }

    pub fn backup(&self) -> Result<BackupMetadata> {
        let rows = self.fts_rows()?;
        let payload = serde_json::to_string(&rows)?;
        let mut checksum_input = Vec::new();
        for (rowid, memory_id, content, metadata_json) in &rows {
            checksum_input.extend_from_slice(rowid.to_string().as_bytes());
            checksum_input.extend_from_slice(memory_id.as_bytes());
            checksum_input.extend_from_slice(content.as_bytes());
            checksum_input.extend_from_slice(metadata_json.as_bytes());
        }
        let checksum = format!("{:08x}", fletcher32(&checksum_input));
        let id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now();

        self.storage.with_connection(|conn| {
            conn.execute(
                "INSERT INTO search_index_backups (id, created_at, row_count, checksum, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, created_at.to_rfc3339(), rows.len() as i64, checksum, payload],
            )?;
            Ok(())
        })?;

        Ok(BackupMetadata { id, created_at, row_count: rows.len() as i64, checksum })
    }

    /// Verify the stored checksum, then wipe and reinsert FTS rows from the
    /// backup payload inside one transaction.
    pub fn restore(&self, backup_id: &str) -> Result<bool> {
        let row: Option<(String, String)> = self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT checksum, payload FROM search_index_backups WHERE id = ?1",
                    params![backup_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .ok())
        })?;

        let Some((checksum, payload)) = row else {
            return Ok(false);
        };

        let rows: Vec<(i64, String, String, String)> = serde_json::from_str(&payload)?;
        let mut checksum_input = Vec::new();
        for (rowid, memory_id, content, metadata_json) in &rows {
            checksum_input.extend_from_slice(rowid.to_string().as_bytes());
            checksum_input.extend_from_slice(memory_id.as_bytes());
            checksum_input.extend_from_slice(content.as_bytes());
            checksum_input.extend_from_slice(metadata_json.as_bytes());
        }
        if format!("{:08x}", fletcher32(&checksum_input)) != checksum {
            return Err(MemoryError::Validation("backup checksum mismatch".into()));
        }

        self.storage.with_transaction(|conn| {
            conn.execute("DELETE FROM memory_fts", [])?;
            for (_, memory_id, content, metadata_json) in &rows {
                conn.execute(
                    "INSERT INTO memory_fts(memory_id, content, metadata_json) VALUES (?1, ?2, ?3)",
                    params![memory_id, content, metadata_json],
                )?;
            }
            Ok(())
        })?;

        Ok(true)
    }

    pub fn list_backups(&self, limit: usize) -> Result<Vec<BackupMetadata>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, row_count, checksum FROM search_index_backups
                 ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    let created_at: String = row.get(1)?;
                    Ok(BackupMetadata {
                        id: row.get(0)?,
                        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                            .map(|dt| dt.with_timezone(&chrono::Utc))
                            .unwrap_or_else(|_| chrono::Utc::now()),
                        row_count: row.get(2)?,
                        checksum: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn prune_backups(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<usize> {
        self.storage.with_connection(|conn| {
            let affected = conn.execute(
                "DELETE FROM search_index_backups WHERE created_at < ?1",
                params![older_than.to_rfc3339()],
            )?;
            Ok(affected)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_record() -> FtsIndexManager {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        storage
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
                     VALUES ('m1', 'default', 'hello world', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        FtsIndexManager::new(storage)
    }

    #[test]
    fn healthy_index_scores_excellent() {
        let manager = manager_with_record();
        let report = manager.health_report().unwrap();
        assert_eq!(report.health, IndexHealth::Excellent);
        assert_eq!(report.orphaned_rows, 0);
    }

    #[test]
    fn backup_then_restore_round_trips() {
        let manager = manager_with_record();
        let backup = manager.backup().unwrap();
        assert_eq!(backup.row_count, 1);
        let restored = manager.restore(&backup.id).unwrap();
        assert!(restored);
    }

    #[test]
    fn restore_rejects_unknown_id() {
        let manager = manager_with_record();
        assert!(!manager.restore("does-not-exist").unwrap());
    }

    #[test]
    fn rebuild_repopulates_from_source_tables() {
        let manager = manager_with_record();
        let result = manager.optimize(OptimizeKind::Rebuild).unwrap();
        assert_eq!(result.rows_affected, 1);
    }

    #[test]
    fn fletcher32_is_deterministic() {
        let a = fletcher32(b"hello world");
        let b = fletcher32(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, fletcher32(b"hello worlD"));
    }
}
