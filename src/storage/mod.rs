//! Storage module for persisting harvest data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - The SeenSet behind the dedup ledger
//! - Artifacts, document records and their links
//! - Failure and skip logs
//! - Run tracking and resumable traversal cursors

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between the ledger, sinks and the crawler
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens (or creates) the database at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Wraps a storage backend for sharing between components
pub fn share(storage: SqliteStorage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, mapping mutex poisoning to a database error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|e| StorageError::Database(format!("storage lock poisoned: {}", e)))
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub summary: Option<String>,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A URL that could not be processed after retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEntry {
    pub url: String,
    /// Pipeline stage that failed ("render", "download", ...)
    pub stage: String,
    pub message: String,
    pub attempts: u32,
}

/// An isolated and skipped segment (malformed sitemap, feed or page)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEntry {
    pub url: String,
    pub reason: String,
}
