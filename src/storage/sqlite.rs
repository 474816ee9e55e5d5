//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::record::{DocumentRecord, DownloadedArtifact};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{FailureEntry, RunRecord, RunStatus, SkipEntry};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database file and applies the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database, used by tests and dry runs
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
        summary: row.get(5)?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<DownloadedArtifact> {
    Ok(DownloadedArtifact {
        checksum: row.get(0)?,
        local_path: row.get(1)?,
        section: row.get(2)?,
        year_bucket: row.get(3)?,
        source_url: row.get(4)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        source_url: row.get(0)?,
        title: row.get(1)?,
        series_id: row.get(2)?,
        reference_id: row.get(3)?,
        description: row.get(4)?,
        date: row.get(5)?,
    })
}

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, summary";
const ARTIFACT_COLUMNS: &str = "checksum, local_path, section, year_bucket, source_url";
const DOCUMENT_COLUMNS: &str = "url, title, series_id, reference_id, description, date";

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus, summary: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, summary = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, summary, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== SeenSet =====

    fn is_url_seen(&self, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM seen_urls WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn is_checksum_seen(&self, checksum: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM artifacts WHERE checksum = ?1
                 UNION ALL SELECT 1 FROM seen_urls WHERE checksum = ?1
                 LIMIT 1",
                params![checksum],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_seen(
        &mut self,
        url: &str,
        checksum: Option<&str>,
        run_id: i64,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO seen_urls (url, checksum, run_id, seen_at) VALUES (?1, ?2, ?3, ?4)",
            params![url, checksum, run_id, now],
        )?;
        Ok(inserted > 0)
    }

    fn count_seen(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM seen_urls", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Artifacts =====

    fn insert_artifact(&mut self, artifact: &DownloadedArtifact) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO artifacts (checksum, local_path, section, year_bucket, source_url, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                artifact.checksum,
                artifact.local_path,
                artifact.section,
                artifact.year_bucket,
                artifact.source_url,
                now
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_artifact_by_checksum(
        &self,
        checksum: &str,
    ) -> StorageResult<Option<DownloadedArtifact>> {
        let artifact = self
            .conn
            .query_row(
                &format!("SELECT {} FROM artifacts WHERE checksum = ?1", ARTIFACT_COLUMNS),
                params![checksum],
                artifact_from_row,
            )
            .optional()?;
        Ok(artifact)
    }

    fn count_artifacts(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_artifacts_by_year(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT year_bucket, COUNT(*) FROM artifacts GROUP BY year_bucket ORDER BY year_bucket",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== Documents =====

    fn upsert_document(&mut self, record: &DocumentRecord, run_id: i64) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO documents
             (url, title, series_id, reference_id, description, date, run_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.source_url,
                record.title,
                record.series_id,
                record.reference_id,
                record.description,
                record.date,
                run_id,
                now
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_document(&self, url: &str) -> StorageResult<Option<DocumentRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE url = ?1", DOCUMENT_COLUMNS),
                params![url],
                document_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list_documents(&self) -> StorageResult<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY id",
            DOCUMENT_COLUMNS
        ))?;
        let records = stmt
            .query_map([], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn link_artifact(&mut self, document_url: &str, checksum: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO document_artifacts (document_url, checksum) VALUES (?1, ?2)",
            params![document_url, checksum],
        )?;
        Ok(())
    }

    fn artifacts_for_document(
        &self,
        document_url: &str,
    ) -> StorageResult<Vec<DownloadedArtifact>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.checksum, a.local_path, a.section, a.year_bucket, a.source_url
             FROM artifacts a
             JOIN document_artifacts da ON da.checksum = a.checksum
             WHERE da.document_url = ?1
             ORDER BY a.id",
        )?;
        let artifacts = stmt
            .query_map(params![document_url], artifact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(artifacts)
    }

    // ===== Failure and Skip Logs =====

    fn record_failure(&mut self, entry: &FailureEntry, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO failures (url, stage, message, attempts, run_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![entry.url, entry.stage, entry.message, entry.attempts, run_id, now],
        )?;
        Ok(())
    }

    fn record_skip(&mut self, entry: &SkipEntry, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO skips (url, reason, run_id, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![entry.url, entry.reason, run_id, now],
        )?;
        Ok(())
    }

    fn list_failures(&self, run_id: i64) -> StorageResult<Vec<FailureEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, stage, message, attempts FROM failures WHERE run_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(FailureEntry {
                    url: row.get(0)?,
                    stage: row.get(1)?,
                    message: row.get(2)?,
                    attempts: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn list_skips(&self, run_id: i64) -> StorageResult<Vec<SkipEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, reason FROM skips WHERE run_id = ?1 ORDER BY id")?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(SkipEntry {
                    url: row.get(0)?,
                    reason: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ===== Traversal Cursors =====

    fn save_cursor(&mut self, authority: &str, strategy: &str, cursor: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO cursors (authority, strategy, cursor, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(authority, strategy) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at",
            params![authority, strategy, cursor, now],
        )?;
        Ok(())
    }

    fn load_cursor(&self, authority: &str, strategy: &str) -> StorageResult<Option<String>> {
        let cursor = self
            .conn
            .query_row(
                "SELECT cursor FROM cursors WHERE authority = ?1 AND strategy = ?2",
                params![authority, strategy],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cursor)
    }

    fn clear_cursor(&mut self, authority: &str, strategy: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM cursors WHERE authority = ?1 AND strategy = ?2",
            params![authority, strategy],
        )?;
        Ok(())
    }

    fn clear_all_cursors(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM cursors", [])?;
        Ok(())
    }
}
