//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::record::{DocumentRecord, DownloadedArtifact};
use crate::storage::{FailureEntry, RunRecord, RunStatus, SkipEntry};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writers take `&mut self`; callers share a backend behind a mutex and hold the
/// lock only for the duration of one call.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status and serialized summary
    fn finish_run(&mut self, run_id: i64, status: RunStatus, summary: &str) -> StorageResult<()>;

    // ===== SeenSet =====

    fn is_url_seen(&self, url: &str) -> StorageResult<bool>;

    fn is_checksum_seen(&self, checksum: &str) -> StorageResult<bool>;

    /// Inserts a URL into the SeenSet
    ///
    /// Returns false if the URL was already present; the existing row is left untouched.
    fn insert_seen(&mut self, url: &str, checksum: Option<&str>, run_id: i64)
        -> StorageResult<bool>;

    fn count_seen(&self) -> StorageResult<u64>;

    // ===== Artifacts =====

    /// Inserts an artifact unless one with the same checksum exists
    ///
    /// Returns true if this call created the row.
    fn insert_artifact(&mut self, artifact: &DownloadedArtifact) -> StorageResult<bool>;

    fn get_artifact_by_checksum(&self, checksum: &str)
        -> StorageResult<Option<DownloadedArtifact>>;

    fn count_artifacts(&self) -> StorageResult<u64>;

    /// Artifact counts grouped by year bucket
    fn count_artifacts_by_year(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Documents =====

    /// Inserts a document unless its source URL is already present
    ///
    /// Returns true if this call created the row. Duplicates are not errors.
    fn upsert_document(&mut self, record: &DocumentRecord, run_id: i64) -> StorageResult<bool>;

    fn get_document(&self, url: &str) -> StorageResult<Option<DocumentRecord>>;

    /// All documents in insertion order
    fn list_documents(&self) -> StorageResult<Vec<DocumentRecord>>;

    fn count_documents(&self) -> StorageResult<u64>;

    /// Associates an artifact with a document; repeated links are ignored
    fn link_artifact(&mut self, document_url: &str, checksum: &str) -> StorageResult<()>;

    fn artifacts_for_document(&self, document_url: &str) -> StorageResult<Vec<DownloadedArtifact>>;

    // ===== Failure and Skip Logs =====

    fn record_failure(&mut self, entry: &FailureEntry, run_id: i64) -> StorageResult<()>;

    fn record_skip(&mut self, entry: &SkipEntry, run_id: i64) -> StorageResult<()>;

    fn list_failures(&self, run_id: i64) -> StorageResult<Vec<FailureEntry>>;

    fn list_skips(&self, run_id: i64) -> StorageResult<Vec<SkipEntry>>;

    // ===== Traversal Cursors =====

    fn save_cursor(&mut self, authority: &str, strategy: &str, cursor: &str) -> StorageResult<()>;

    fn load_cursor(&self, authority: &str, strategy: &str) -> StorageResult<Option<String>>;

    fn clear_cursor(&mut self, authority: &str, strategy: &str) -> StorageResult<()>;

    fn clear_all_cursors(&mut self) -> StorageResult<()>;
}
