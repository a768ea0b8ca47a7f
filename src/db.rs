use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::EventRecord;
use crate::utils;

/// Sent-notification log plus a diagnostic copy of every scraped event.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                first_seen_utc TEXT NOT NULL,
                last_seen_utc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS notifications(
                event_id TEXT NOT NULL,
                offset_days INTEGER NOT NULL,
                sent_at_utc TEXT NOT NULL,
                dispatch_id TEXT,
                PRIMARY KEY (event_id, offset_days)
            );",
        )?;
        Ok(())
    }

    pub fn upsert_event(&self, event: &EventRecord) -> rusqlite::Result<()> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(event).map_err(|err| {
            rusqlite::Error::ToSqlConversionFailure(Box::new(err))
        })?;
        self.conn.execute(
            "INSERT INTO events (id, payload, first_seen_utc, last_seen_utc)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET
               payload = excluded.payload,
               last_seen_utc = excluded.last_seen_utc",
            params![event.id, payload, now],
        )?;
        Ok(())
    }

    pub fn event_count(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
    }

    pub fn is_sent(&self, event_id: &str, offset_days: u32) -> rusqlite::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM notifications WHERE event_id = ?1 AND offset_days = ?2",
                params![event_id, offset_days],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Records a sent reminder. Returns false when the pair was already logged.
    pub fn mark_sent(
        &self,
        event_id: &str,
        offset_days: u32,
        dispatch_id: &str,
    ) -> rusqlite::Result<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO notifications (event_id, offset_days, sent_at_utc, dispatch_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![event_id, offset_days, now, dispatch_id],
        )?;
        Ok(inserted == 1)
    }
}
