//! SQLite run history: one row per reconciliation run and one per document it saw.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::services::region::RegionResolver;
use crate::types::{BatchNotice, BatchSummary};

/// `<data dir>/invoice-reconciler/history.db`, or the working directory when no data dir exists.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("invoice-reconciler"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("history.db")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub id: i64,
    pub created_at: String,
    pub workbook_path: String,
    pub output_path: Option<String>,
    pub status: String,
    pub new_count: i64,
    pub skipped_count: i64,
    pub unresolved_count: i64,
    pub unreadable_count: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDocumentRow {
    pub source: String,
    pub identifier: Option<String>,
    pub region: Option<String>,
    pub outcome: String,
}

pub struct Db {
    conn: Mutex<Connection>,
}

fn lock_error<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::Config(format!("history database lock poisoned: {}", e))
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::migrate(&conn)?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                workbook_path TEXT NOT NULL,
                status TEXT NOT NULL,
                new_count INTEGER NOT NULL DEFAULT 0,
                skipped_count INTEGER NOT NULL DEFAULT 0,
                unresolved_count INTEGER NOT NULL DEFAULT 0,
                unreadable_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            );
            CREATE TABLE IF NOT EXISTS run_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                source TEXT NOT NULL,
                identifier TEXT,
                region TEXT,
                outcome TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_run_documents_run ON run_documents(run_id);
            ",
        )?;

        // Migration 002: output path (runs may write to a copy of the workbook)
        let current_version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
            .unwrap_or(1);
        if current_version < 2 {
            if let Err(e) = conn.execute("ALTER TABLE runs ADD COLUMN output_path TEXT", []) {
                if !e.to_string().contains("duplicate column") {
                    return Err(e.into());
                }
            }
            conn.execute("UPDATE schema_version SET version = 2", [])?;
        }
        Ok(())
    }

    /// Record a completed run and the outcome of every document it saw.
    pub fn record_run(
        &self,
        workbook_path: &str,
        output_path: Option<&str>,
        summary: &BatchSummary,
        resolver: &RegionResolver,
    ) -> Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().map_err(lock_error)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO runs (created_at, workbook_path, output_path, status, new_count, skipped_count, unresolved_count, unreadable_count) VALUES (?, ?, ?, 'completed', ?, ?, ?, ?)",
            params![
                created_at,
                workbook_path,
                output_path,
                summary.new_count as i64,
                summary.skipped_count as i64,
                summary.unresolved_count as i64,
                summary.unreadable_count as i64
            ],
        )?;
        let run_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO run_documents (run_id, source, identifier, region, outcome) VALUES (?, ?, ?, ?, ?)",
            )?;
            for record in &summary.records {
                let region = record.region.map(|r| resolver.name(r).to_string());
                stmt.execute(params![run_id, record.source, record.identifier, region, "accepted"])?;
            }
            for notice in &summary.notices {
                let (source, identifier, outcome) = match notice {
                    BatchNotice::Duplicate { source, identifier } => (source, Some(identifier), "duplicate"),
                    BatchNotice::UnresolvedRegion { source, identifier } => {
                        (source, Some(identifier), "unresolved")
                    }
                    BatchNotice::UnreadableDocument { source, .. } => (source, None, "unreadable"),
                    _ => continue,
                };
                stmt.execute(params![run_id, source, identifier, Option::<String>::None, outcome])?;
            }
        }
        tx.commit()?;
        Ok(run_id)
    }

    /// Record a run that stopped with an error.
    pub fn record_failure(&self, workbook_path: &str, error_message: &str) -> Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().map_err(lock_error)?;
        conn.execute(
            "INSERT INTO runs (created_at, workbook_path, status, error_message) VALUES (?, ?, 'failed', ?)",
            params![created_at, workbook_path, error_message],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRow>> {
        let conn = self.conn.lock().map_err(lock_error)?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, workbook_path, output_path, status, new_count, skipped_count, unresolved_count, unreadable_count, error_message FROM runs ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                created_at: row.get(1)?,
                workbook_path: row.get(2)?,
                output_path: row.get(3)?,
                status: row.get(4)?,
                new_count: row.get(5)?,
                skipped_count: row.get(6)?,
                unresolved_count: row.get(7)?,
                unreadable_count: row.get(8)?,
                error_message: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn run_documents(&self, run_id: i64) -> Result<Vec<RunDocumentRow>> {
        let conn = self.conn.lock().map_err(lock_error)?;
        let mut stmt = conn.prepare(
            "SELECT source, identifier, region, outcome FROM run_documents WHERE run_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(RunDocumentRow {
                source: row.get(0)?,
                identifier: row.get(1)?,
                region: row.get(2)?,
                outcome: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
