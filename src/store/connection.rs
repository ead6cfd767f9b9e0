//! Database connection management (§4.1, §5.1).
//!
//! A single logical connection behind a `parking_lot::Mutex`, mirroring the
//! teacher's `storage::connection::Storage`. The engine is a single-writer
//! embedded store; concurrent async callers serialize through this mutex,
//! which is the cooperative scheduling model §5 calls for when the
//! deployment provides no external pooling.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;

/// Owns the relational connection, schema lifecycle, and transaction helper
/// that every other manager is built on top of.
pub struct Storage {
    db_path: String,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database at `db_path`, applying migrations.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;
        run_migrations(&conn)?;
        Ok(Self {
            db_path: db_path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database, used by tests and the CLI's
    /// throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn create_connection(db_path: &str) -> Result<Connection> {
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Run `f` with shared access to the connection (reads, or writes that
    /// manage their own transaction boundary).
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute `f` atomically: any error rolls back the whole transaction
    /// and is reported to the caller (§4.1 transaction helper).
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='long_term_memory'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(count, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn reopening_in_memory_is_idempotent() {
        // Re-running migrations against a fresh connection must not error.
        let _a = Storage::open_in_memory().unwrap();
        let _b = Storage::open_in_memory().unwrap();
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();
        let result: Result<()> = storage.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO chat_history (id, namespace, user_input, ai_output, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params!["c1", "default", "hi", "hello", "2024-01-01T00:00:00Z"],
            )?;
            Err(crate::error::MemoryError::Internal("boom".into()))
        });
        assert!(result.is_err());
        storage
            .with_connection(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chat_history", [], |row| row.get(0))
                    .unwrap();
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }
}
