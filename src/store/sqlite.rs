use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::domain::MailRecord;
use crate::error::{Error, Result};
use crate::store::repo::MailStore;

/// File-backed store for `mail_state` rows.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if absent) and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::StoreOpen(format!("open {}: {e}", path.display())))?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StoreOpen(format!("open in-memory: {e}")))?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Idempotent migration; safe to run on every open.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                PRAGMA journal_mode=WAL;

                CREATE TABLE IF NOT EXISTS mail_state (
                    id        INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject   TEXT NOT NULL,
                    address   TEXT NOT NULL,
                    send_time TEXT NOT NULL
                );
                "#,
            )
            .map_err(|e| Error::Schema(format!("migrate mail_state: {e}")))
    }
}

fn parse_send_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Read(format!("query: send_time {raw:?}: {e}")))
}

impl MailStore for SqliteStore {
    fn insert(&self, record: &MailRecord) -> Result<MailRecord> {
        self.conn
            .execute(
                r#"
                INSERT INTO mail_state (subject, address, send_time)
                VALUES (?1, ?2, ?3)
                "#,
                params![
                    record.subject,
                    record.address,
                    record.send_time.to_rfc3339()
                ],
            )
            .map_err(|e| Error::Write(format!("insert: {e}")))?;

        Ok(MailRecord {
            id: self.conn.last_insert_rowid(),
            ..record.clone()
        })
    }

    fn find_all(&self) -> Result<Vec<MailRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id, subject, address, send_time
                FROM mail_state
                ORDER BY id
                "#,
            )
            .map_err(|e| Error::Read(format!("query: {e}")))?;

        let mut rows = stmt
            .query([])
            .map_err(|e| Error::Read(format!("query: {e}")))?;

        let mut out = Vec::new();
        while let Some(r) = rows.next().map_err(|e| Error::Read(format!("query: {e}")))? {
            let get = |i: usize| -> Result<String> {
                r.get(i).map_err(|e| Error::Read(format!("query: {e}")))
            };
            let id: i64 = r.get(0).map_err(|e| Error::Read(format!("query: {e}")))?;
            out.push(MailRecord {
                id,
                subject: get(1)?,
                address: get(2)?,
                send_time: parse_send_time(&get(3)?)?,
            });
        }
        Ok(out)
    }
}
