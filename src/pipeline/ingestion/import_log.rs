use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use crate::error::Result;

/// One successfully imported export file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportEntry {
    pub idempotency_key: String,
    pub run_id: String,
    pub source: String,
    /// Database environment the rows were written to
    pub environment: String,
    pub path: String,
    pub sha256: String,
    pub imported_at: DateTime<Utc>,
    pub records: usize,
    pub rejected: usize,
}

/// Which input files have already been imported, kept beside the data in `import_log/meta.db`
pub struct ImportLog {
    conn: Connection,
}

impl ImportLog {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        let db_path = data_root.as_ref().join("import_log").join("meta.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS imports (
                idempotency_key TEXT PRIMARY KEY,
                run_id          TEXT NOT NULL,
                source          TEXT NOT NULL,
                environment     TEXT NOT NULL,
                path            TEXT NOT NULL,
                sha256          TEXT NOT NULL,
                imported_at     INTEGER NOT NULL,
                records         INTEGER NOT NULL,
                rejected        INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn find(&self, idempotency_key: &str) -> Result<Option<ImportEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT idempotency_key, run_id, source, environment, path, sha256, imported_at, records, rejected
                 FROM imports WHERE idempotency_key = ?1",
                params![idempotency_key],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn record(&self, entry: &ImportEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO imports (idempotency_key, run_id, source, environment, path, sha256, imported_at, records, rejected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(idempotency_key) DO UPDATE SET run_id=excluded.run_id,
                 imported_at=excluded.imported_at, records=excluded.records, rejected=excluded.rejected",
            params![
                entry.idempotency_key,
                entry.run_id,
                entry.source,
                entry.environment,
                entry.path,
                entry.sha256,
                entry.imported_at.timestamp(),
                entry.records as i64,
                entry.rejected as i64,
            ],
        )?;
        Ok(())
    }

    /// Most recent imports first
    pub fn recent(&self, limit: usize) -> Result<Vec<ImportEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT idempotency_key, run_id, source, environment, path, sha256, imported_at, records, rejected
             FROM imports ORDER BY imported_at DESC, source LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportEntry> {
    let ts: i64 = row.get(6)?;
    Ok(ImportEntry {
        idempotency_key: row.get(0)?,
        run_id: row.get(1)?,
        source: row.get(2)?,
        environment: row.get(3)?,
        path: row.get(4)?,
        sha256: row.get(5)?,
        imported_at: DateTime::from_timestamp(ts, 0).unwrap_or_default(),
        records: row.get::<_, i64>(7)? as usize,
        rejected: row.get::<_, i64>(8)? as usize,
    })
}
