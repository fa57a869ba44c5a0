//! SQLite-backed event directory and status-change audit log.
//! Stored timestamps are TEXT and go through [`EventSnapshot::from_raw`], so a
//! malformed value only disables the one field it belongs to.
//!
//! The async trait impls run their queries on tokio's blocking pool; the
//! inherent methods are synchronous and meant for CLI and setup code.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventide_core::{
    EventId, EventSnapshot, EventideError, Lifecycle, RawEvent, Result,
    types::parse_timestamp,
};

use crate::directory::EventDirectory;
use crate::notify::{ChangeNotifier, StatusChange};

const EVENT_COLUMNS: &str = "id, registration_start, registration_end, occurrence_start, \
     occurrence_end, certificate_start, certificate_end, status, sub_status";

/// SQLite-backed directory for events and their status history.
pub struct SqliteDirectory {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> EventideError + '_ {
    move |e| EventideError::Database(format!("{context}: {e}"))
}

fn lock(conn: &Mutex<rusqlite::Connection>) -> Result<MutexGuard<'_, rusqlite::Connection>> {
    conn.lock()
        .map_err(|_| EventideError::Database("connection mutex poisoned".into()))
}

impl SqliteDirectory {
    /// Open or create the event database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        lock(&self.conn)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await
        .map_err(|e| EventideError::Database(format!("blocking task failed: {e}")))?
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Events and their lifecycle timestamps (RFC 3339 text)
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                registration_start TEXT,
                registration_end TEXT,
                occurrence_start TEXT,
                occurrence_end TEXT,
                certificate_start TEXT,
                certificate_end TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                sub_status TEXT NOT NULL DEFAULT 'draft',
                status_updated_at TEXT
            );

            -- Status transition audit log
            CREATE TABLE IF NOT EXISTS status_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                old_status TEXT NOT NULL,
                old_sub_status TEXT NOT NULL,
                new_status TEXT NOT NULL,
                new_sub_status TEXT NOT NULL,
                cause TEXT NOT NULL,             -- 'trigger:<kind>' or 'reconcile'
                changed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_status_changes_event
                ON status_changes(event_id, id);
         ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    // ─── Events ───────────────────────────────────────────────

    /// Insert an event row, or update its timestamps if it exists.
    /// The stored status of an existing row is left to the scheduler.
    pub fn upsert_event(&self, raw: &RawEvent) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO events
                 (id, registration_start, registration_end, occurrence_start, occurrence_end,
                  certificate_start, certificate_end, status, sub_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    registration_start = excluded.registration_start,
                    registration_end = excluded.registration_end,
                    occurrence_start = excluded.occurrence_start,
                    occurrence_end = excluded.occurrence_end,
                    certificate_start = excluded.certificate_start,
                    certificate_end = excluded.certificate_end",
                rusqlite::params![
                    raw.id,
                    raw.registration_start,
                    raw.registration_end,
                    raw.occurrence_start,
                    raw.occurrence_end,
                    raw.certificate_start,
                    raw.certificate_end,
                    raw.status,
                    raw.sub_status,
                ],
            )
            .map_err(db_err("Save event"))?;
        Ok(())
    }

    /// Delete an event. Returns whether a row was removed.
    pub fn delete_event(&self, id: &EventId) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM events WHERE id = ?1", [id.as_str()])
            .map_err(db_err("Delete event"))?;
        Ok(n > 0)
    }

    /// Stored row for one event, untyped.
    pub fn raw_event(&self, id: &EventId) -> Result<Option<RawEvent>> {
        load_event(&*self.conn()?, id)
    }

    /// Every stored row, ordered by id.
    pub fn raw_events(&self) -> Result<Vec<RawEvent>> {
        load_events(&*self.conn()?)
    }

    // ─── Status history ───────────────────────────────────────

    /// Most recent status changes for an event, newest first.
    pub fn history(&self, id: &EventId, limit: usize) -> Result<Vec<StatusChange>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT event_id, old_status, old_sub_status, new_status, new_sub_status,
                        cause, changed_at
                 FROM status_changes WHERE event_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err("Load history"))?;
        let rows = stmt
            .query_map(rusqlite::params![id.as_str(), limit as i64], |row| {
                Ok([
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ])
            })
            .map_err(db_err("Load history"))?;

        let mut changes = Vec::new();
        for row in rows {
            let [event_id, old_s, old_sub, new_s, new_sub, cause, changed_at] =
                row.map_err(db_err("Load history"))?;
            changes.push(StatusChange {
                event_id: EventId::new(event_id),
                old: Lifecycle::new(old_s.parse()?, old_sub.parse()?),
                new: Lifecycle::new(new_s.parse()?, new_sub.parse()?),
                cause: cause.parse()?,
                at: parse_timestamp(&changed_at).ok_or_else(|| {
                    EventideError::Parse(format!("bad changed_at '{changed_at}'"))
                })?,
            });
        }
        Ok(changes)
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        id: row.get(0)?,
        registration_start: row.get(1)?,
        registration_end: row.get(2)?,
        occurrence_start: row.get(3)?,
        occurrence_end: row.get(4)?,
        certificate_start: row.get(5)?,
        certificate_end: row.get(6)?,
        status: row.get(7)?,
        sub_status: row.get(8)?,
    })
}

fn load_event(conn: &rusqlite::Connection, id: &EventId) -> Result<Option<RawEvent>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"))
        .map_err(db_err("Load event"))?;
    let mut rows = stmt
        .query_map([id.as_str()], row_to_raw)
        .map_err(db_err("Load event"))?;
    rows.next().transpose().map_err(db_err("Load event"))
}

fn load_events(conn: &rusqlite::Connection) -> Result<Vec<RawEvent>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id"))
        .map_err(db_err("Load events"))?;
    let rows = stmt
        .query_map([], row_to_raw)
        .map_err(db_err("Load events"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err("Load events"))
}

#[async_trait]
impl EventDirectory for SqliteDirectory {
    async fn list_all(&self) -> Result<Vec<EventSnapshot>> {
        let raws = self.blocking(load_events).await?;
        Ok(raws.into_iter().map(EventSnapshot::from_raw).collect())
    }

    async fn get(&self, id: &EventId) -> Result<Option<EventSnapshot>> {
        let id = id.clone();
        let raw = self.blocking(move |conn| load_event(conn, &id)).await?;
        Ok(raw.map(EventSnapshot::from_raw))
    }

    async fn set_status(
        &self,
        id: &EventId,
        lifecycle: Lifecycle,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let key = id.clone();
        let n = self
            .blocking(move |conn| {
                conn.execute(
                    "UPDATE events SET status = ?1, sub_status = ?2, status_updated_at = ?3
                     WHERE id = ?4",
                    rusqlite::params![
                        lifecycle.status.as_str(),
                        lifecycle.sub_status.as_str(),
                        at.to_rfc3339(),
                        key.as_str(),
                    ],
                )
                .map_err(db_err("Set status"))
            })
            .await?;
        if n == 0 {
            return Err(EventideError::Directory(format!("event {id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeNotifier for SqliteDirectory {
    async fn record(&self, change: &StatusChange) -> Result<()> {
        let change = change.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO status_changes
                 (event_id, old_status, old_sub_status, new_status, new_sub_status, cause, changed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    change.event_id.as_str(),
                    change.old.status.as_str(),
                    change.old.sub_status.as_str(),
                    change.new.status.as_str(),
                    change.new.sub_status.as_str(),
                    change.cause.to_string(),
                    change.at.to_rfc3339(),
                ],
            )
            .map_err(|e| EventideError::Notifier(format!("Record change: {e}")))
        })
        .await?;
        Ok(())
    }
}
