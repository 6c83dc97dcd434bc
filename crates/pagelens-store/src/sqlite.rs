use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use pagelens_common::{Error, KeyValueStore, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

/// Sqlite-backed durable key-value store.
///
/// Hosts embedding the core natively use this in place of the browser's
/// storage area. Values are opaque strings; conversation history and
/// provider settings both serialize into it.
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening key-value store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Storage(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_entries (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );",
            )
            .map_err(|e| Error::Storage(format!("migration failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Storage(format!("failed to read key '{key}': {e}")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = datetime('now')",
            params![key, value],
        )
        .map_err(|e| Error::Storage(format!("failed to write key '{key}': {e}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .map_err(|e| Error::Storage(format!("failed to remove key '{key}': {e}")))?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT key FROM kv_entries WHERE key LIKE ?1 || '%'")
            .map_err(|e| Error::Storage(format!("failed to prepare prefix query: {e}")))?;

        let rows = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Storage(format!("failed to scan keys: {e}")))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| Error::Storage(format!("failed to read key row: {e}")))?);
        }
        Ok(keys)
    }
}
