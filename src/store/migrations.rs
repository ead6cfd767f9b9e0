//! Schema bootstrap: record tables, the FTS virtual table, and the triggers
//! that keep them in sync (§4.1, §4.1.1).
//!
//! FTS5 rowids must be 64-bit integers, but [`crate::types::MemoryId`] is a
//! UUID string (§3.1), so `memory_fts` is a standalone (non `content=`)
//! FTS5 table keyed by its own internal rowid and carrying the record's
//! `memory_id` as an unindexed column used for every join and delete. This
//! is the mapping decision recorded in DESIGN.md; it satisfies the same
//! "FTS row exists iff the record exists and has non-empty content"
//! invariant (I5) without requiring the public id to be numeric.

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i32 = 1;

const RECORD_COLUMNS: &str = r#"
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    classification TEXT NOT NULL,
    importance TEXT NOT NULL,
    topic TEXT,
    entities TEXT NOT NULL DEFAULT '[]',
    keywords TEXT NOT NULL DEFAULT '[]',
    confidence_score REAL NOT NULL DEFAULT 0.0,
    classification_reason TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    extraction_timestamp TEXT NOT NULL,
    relationships TEXT NOT NULL DEFAULT '[]',
    supersedes TEXT NOT NULL DEFAULT '[]',
    conscious_processed INTEGER NOT NULL DEFAULT 0,
    consolidation TEXT,
    state TEXT NOT NULL DEFAULT 'PENDING'
"#;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS short_term_memory ({RECORD_COLUMNS});
        CREATE TABLE IF NOT EXISTS long_term_memory ({RECORD_COLUMNS});

        CREATE TABLE IF NOT EXISTS chat_history (
            id TEXT PRIMARY KEY,
            namespace TEXT NOT NULL,
            chat_id TEXT,
            user_input TEXT NOT NULL,
            ai_output TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS state_transitions (
            id TEXT PRIMARY KEY,
            memory_id TEXT NOT NULL,
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            reason TEXT,
            metadata TEXT,
            agent_id TEXT,
            error_message TEXT,
            processing_time_ms INTEGER
        );

        CREATE TABLE IF NOT EXISTS search_index_backups (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rollback_snapshots (
            token TEXT PRIMARY KEY,
            primary_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            snapshot TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
            memory_id UNINDEXED,
            content,
            metadata_json UNINDEXED,
            tokenize = 'porter unicode61'
        );

        CREATE INDEX IF NOT EXISTS idx_stm_namespace ON short_term_memory(namespace, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_ltm_namespace ON long_term_memory(namespace, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_stm_state ON short_term_memory(state);
        CREATE INDEX IF NOT EXISTS idx_ltm_state ON long_term_memory(state);
        CREATE INDEX IF NOT EXISTS idx_transitions_memory ON state_transitions(memory_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_chat_namespace ON chat_history(namespace, created_at DESC);
        "#
    ))?;

    install_fts_triggers(conn, "short_term_memory")?;
    install_fts_triggers(conn, "long_term_memory")?;

    Ok(())
}

/// Install the AFTER INSERT/UPDATE/DELETE trigger trio that keeps
/// `memory_fts` in lock-step with `table_name` (§4.1).
fn install_fts_triggers(conn: &Connection, table_name: &str) -> Result<()> {
    let metadata_json_expr = |alias: &str| {
        format!(
            "json_object(
                'memory_type', lower({alias}.classification),
                'category_primary', COALESCE({alias}.topic, lower({alias}.classification)),
                'importance_score', (CASE {alias}.importance
                    WHEN 'CRITICAL' THEN 0.9
                    WHEN 'HIGH' THEN 0.7
                    WHEN 'MEDIUM' THEN 0.5
                    ELSE 0.3 END),
                'classification', {alias}.classification,
                'created_at', {alias}.created_at,
                'namespace', {alias}.namespace
            )"
        )
    };

    conn.execute_batch(&format!(
        r#"
        CREATE TRIGGER IF NOT EXISTS {table}_fts_ai AFTER INSERT ON {table}
        WHEN NEW.content != '' BEGIN
            INSERT INTO memory_fts(memory_id, content, metadata_json)
            VALUES (NEW.id, NEW.content, {meta_new});
        END;

        CREATE TRIGGER IF NOT EXISTS {table}_fts_ad AFTER DELETE ON {table} BEGIN
            DELETE FROM memory_fts WHERE memory_id = OLD.id;
        END;

        CREATE TRIGGER IF NOT EXISTS {table}_fts_au AFTER UPDATE ON {table} BEGIN
            DELETE FROM memory_fts WHERE memory_id = OLD.id;
            INSERT INTO memory_fts(memory_id, content, metadata_json)
            SELECT NEW.id, NEW.content, {meta_new}
            WHERE NEW.content != '';
        END;
        "#,
        table = table_name,
        meta_new = metadata_json_expr("NEW"),
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_populates_fts() {
        let conn = conn();
        conn.execute(
            "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
             VALUES (?1, 'default', 'hello world', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            params!["m1"],
        ).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_fts WHERE memory_id = 'm1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_content_does_not_populate_fts() {
        let conn = conn();
        conn.execute(
            "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
             VALUES (?1, 'default', '', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            params!["m2"],
        ).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_fts WHERE memory_id = 'm2'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn delete_removes_fts_row() {
        let conn = conn();
        conn.execute(
            "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
             VALUES (?1, 'default', 'hello world', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            params!["m3"],
        ).unwrap();
        conn.execute("DELETE FROM long_term_memory WHERE id = 'm3'", []).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_fts WHERE memory_id = 'm3'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn update_refreshes_fts_metadata() {
        let conn = conn();
        conn.execute(
            "INSERT INTO long_term_memory (id, namespace, content, classification, importance, created_at, updated_at, extraction_timestamp)
             VALUES (?1, 'default', 'hello world', 'CONVERSATIONAL', 'MEDIUM', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            params!["m4"],
        ).unwrap();
        conn.execute(
            "UPDATE long_term_memory SET importance = 'HIGH' WHERE id = 'm4'",
            [],
        )
        .unwrap();
        let meta: String = conn
            .query_row(
                "SELECT metadata_json FROM memory_fts WHERE memory_id = 'm4'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(meta.contains("0.7"));
    }

    #[test]
    fn rerunning_migrations_is_idempotent() {
        let conn = conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='long_term_memory'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
