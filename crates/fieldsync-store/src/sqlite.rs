//! SQLite implementation of the StateStore trait.
//!
//! Uses rusqlite with bundled SQLite. Statements are short and run inline
//! under the connection mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use fieldsync_core::{RecordEdit, Timestamp};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::StateStore;

/// SQLite-based state store. Thread-safe via internal Mutex.
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Open a database at `path`, creating and migrating it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&mut conn)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load_watermark(&self, device_id: &str) -> Result<Option<Timestamp>> {
        self.with_conn(|conn| {
            let millis: Option<i64> = conn
                .query_row(
                    "SELECT watermark FROM device_state WHERE device_id = ?1",
                    params![device_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(millis.map(Timestamp::from_millis))
        })
    }

    async fn save_watermark(&self, device_id: &str, at: Timestamp) -> Result<Timestamp> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO device_state (device_id, watermark, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(device_id) DO UPDATE SET
                    watermark = MAX(watermark, excluded.watermark),
                    updated_at = excluded.updated_at",
                params![device_id, at.as_millis(), Timestamp::now().as_millis()],
            )?;
            let stored: i64 = conn.query_row(
                "SELECT watermark FROM device_state WHERE device_id = ?1",
                params![device_id],
                |row| row.get(0),
            )?;
            Ok(Timestamp::from_millis(stored))
        })
    }

    async fn append_pending(&self, device_id: &str, edits: &[RecordEdit]) -> Result<()> {
        let mut encoded = Vec::with_capacity(edits.len());
        for edit in edits {
            encoded.push((edit.record_id.clone(), serde_json::to_string(edit)?));
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO outbound_journal (device_id, record_id, edit, enqueued_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                let now = Timestamp::now().as_millis();
                for (record_id, edit) in &encoded {
                    stmt.execute(params![device_id, record_id, edit, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn pending(&self, device_id: &str) -> Result<Vec<RecordEdit>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT edit FROM outbound_journal WHERE device_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map(params![device_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.iter()
            .map(|text| serde_json::from_str(text).map_err(StoreError::from))
            .collect()
    }

    async fn remove_pending(&self, device_id: &str, count: usize) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM outbound_journal WHERE seq IN (
                    SELECT seq FROM outbound_journal
                    WHERE device_id = ?1 ORDER BY seq LIMIT ?2
                 )",
                params![device_id, count as i64],
            )?;
            Ok(removed)
        })
    }
}
