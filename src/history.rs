use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveDateTime;
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ValueRef},
    Connection, Row,
};
use tracing::debug;

use crate::{
    error::StorageError,
    model::{HistoryRecord, HistoryStatus, NewHistoryRecord},
};

/// Number of records a history listing shows unless configured otherwise
pub const DEFAULT_LIST_LIMIT: usize = 50;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS downloads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        uploader TEXT,
        duration TEXT,
        view_count TEXT,
        quality TEXT,
        output_path TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        status TEXT NOT NULL DEFAULT 'completed' CHECK (status IN ('completed', 'failed'))
    );
";

/// Append-only log of download attempts backed by a SQLite file.
///
/// No connection is kept between calls: every operation opens the file, runs
/// in its own transaction and closes it again, so the worker's completion path
/// and the UI's reads never share a lock.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Opens (and if needed creates) the log at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { path };
        store.connect()?.execute_batch(SCHEMA)?;
        debug!(path = %store.path.display(), "history store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Persists one record and returns its id
    pub fn append(&self, record: &NewHistoryRecord) -> Result<i64, StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO downloads (title, url, uploader, duration, view_count, quality, output_path, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.title,
                record.url,
                record.uploader,
                record.duration,
                record.view_count,
                record.quality,
                record.output_path,
                record.status.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Most recent first
    pub fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, url, uploader, duration, view_count, quality, output_path, created_at, status
             FROM downloads
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![limit], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Removes one record; a missing id is reported as [`StorageError::NotFound`]
    pub fn delete_one(&self, id: i64) -> Result<(), StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM downloads WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StorageError::NotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes every record, returning how many were deleted
    pub fn clear_all(&self) -> Result<usize, StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM downloads", [])?;
        tx.commit()?;
        Ok(removed)
    }
}

impl FromSql for HistoryStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let created_at: NaiveDateTime = row.get(8)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        uploader: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        duration: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        view_count: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        quality: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        output_path: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        created_at: created_at.and_utc(),
        status: row.get(9)?,
    })
}
