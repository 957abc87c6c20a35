//! On-device persistence: one SQLite table of keyed JSON blobs

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::PersistenceAdapter;
use crate::error::Result;

pub struct SqliteAdapter {
    conn: Connection,
}

impl SqliteAdapter {
    /// Open or create the blob store at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL keeps the frequent small position writes cheap
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::init(conn)
    }

    /// In-memory database, for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(Self { conn })
    }
}

impl PersistenceAdapter for SqliteAdapter {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT value FROM blobs WHERE key = ?1")?;
        let value = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO blobs (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![key, value],
        )?;
        debug!("Wrote {} bytes to key {}", value.len(), key);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(())
    }
}
