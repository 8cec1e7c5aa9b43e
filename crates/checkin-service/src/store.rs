//! Persistence adapters for template sets and attendance records.

use std::path::Path;
use std::sync::Mutex;

use checkin_core::FlattenedTemplates;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;

use crate::attendance::{AttendanceRecord, Location};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad timestamp in store: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Per-identity template documents.
pub trait TemplateStore: Send + Sync {
    /// The stored document, exactly as persisted; `None` when never enrolled.
    fn load(&self, identity: &str) -> Result<Option<Value>, StoreError>;
    /// Replace the identity's template set wholesale.
    fn save(&self, identity: &str, templates: &FlattenedTemplates) -> Result<(), StoreError>;
    /// Returns true if a template set was removed.
    fn remove(&self, identity: &str) -> Result<bool, StoreError>;
}

/// Append-only log of accepted check-ins.
pub trait AttendanceLog: Send + Sync {
    fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError>;
    /// Records for the identity, newest first.
    fn history(&self, identity: &str) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// In-process store, used by tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    templates: DashMap<String, Value>,
    attendance: Mutex<Vec<AttendanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary document, bypassing the codec.
    pub fn insert_raw(&self, identity: &str, document: Value) {
        self.templates.insert(identity.to_string(), document);
    }
}

impl TemplateStore for MemoryStore {
    fn load(&self, identity: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.templates.get(identity).map(|v| v.value().clone()))
    }

    fn save(&self, identity: &str, templates: &FlattenedTemplates) -> Result<(), StoreError> {
        self.templates
            .insert(identity.to_string(), serde_json::to_value(templates)?);
        Ok(())
    }

    fn remove(&self, identity: &str) -> Result<bool, StoreError> {
        Ok(self.templates.remove(identity).is_some())
    }
}

impl AttendanceLog for MemoryStore {
    fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.attendance
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(record.clone());
        Ok(())
    }

    fn history(&self, identity: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let records = self.attendance.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.user_id == identity)
            .cloned()
            .collect())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_templates (
    user_id     TEXT PRIMARY KEY,
    document    TEXT NOT NULL,
    enrolled_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    lat         REAL NOT NULL,
    lng         REAL NOT NULL,
    accuracy    REAL NOT NULL,
    face_count  INTEGER NOT NULL,
    similarity  REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS attendance_by_user ON attendance (user_id, timestamp);
";

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened template store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// When the identity's current template set was written.
    pub fn enrolled_at(&self, identity: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT enrolled_at FROM face_templates WHERE user_id = ?1",
                params![identity],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| parse_timestamp(&s)).transpose()
    }
}

impl TemplateStore for SqliteStore {
    fn load(&self, identity: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT document FROM face_templates WHERE user_id = ?1",
                params![identity],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw.map(|text| match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                // Surfaces to the caller as a malformed template set.
                tracing::warn!(identity, error = %err, "stored template document is not JSON");
                Value::Null
            }
        }))
    }

    fn save(&self, identity: &str, templates: &FlattenedTemplates) -> Result<(), StoreError> {
        let document = serde_json::to_string(templates)?;
        let enrolled_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.conn()?.execute(
            "INSERT INTO face_templates (user_id, document, enrolled_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET document = excluded.document, enrolled_at = excluded.enrolled_at",
            params![identity, document, enrolled_at],
        )?;
        Ok(())
    }

    fn remove(&self, identity: &str) -> Result<bool, StoreError> {
        let n = self
            .conn()?
            .execute("DELETE FROM face_templates WHERE user_id = ?1", params![identity])?;
        Ok(n > 0)
    }
}

impl AttendanceLog for SqliteStore {
    fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO attendance (id, user_id, timestamp, lat, lng, accuracy, face_count, similarity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.user_id,
                record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                record.location.lat,
                record.location.lng,
                record.location.accuracy,
                record.face_count as i64,
                record.similarity as f64,
            ],
        )?;
        Ok(())
    }

    fn history(&self, identity: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, timestamp, lat, lng, accuracy, face_count, similarity
             FROM attendance WHERE user_id = ?1 ORDER BY timestamp DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![identity], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                Location {
                    lat: row.get(3)?,
                    lng: row.get(4)?,
                    accuracy: row.get(5)?,
                },
                row.get::<_, i64>(6)?,
                row.get::<_, f64>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, user_id, timestamp, location, face_count, similarity) = row?;
            records.push(AttendanceRecord {
                id,
                user_id,
                timestamp: parse_timestamp(&timestamp)?,
                location,
                face_count: face_count.max(0) as usize,
                similarity: similarity as f32,
            });
        }
        Ok(records)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
