//! Sink Writer traits and types
//!
//! A [`RecordSink`] accepts finalized records for persistence. Writes are upserts keyed
//! by source URL: a record whose URL is already stored is ignored, never an error.

use crate::record::DocumentRecord;
use crate::storage::StorageError;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

pub trait RecordSink: Send + Sync {
    /// Inserts the record unless its source URL is already present
    ///
    /// Returns `true` if the record was new.
    fn write(&self, record: &DocumentRecord) -> OutputResult<bool>;

    /// Associates a stored artifact with the record for `source_url`
    fn link_artifact(&self, source_url: &str, checksum: &str) -> OutputResult<()>;

    /// Writes a flat tabular snapshot of every stored record
    ///
    /// Returns the number of rows written.
    fn export(&self, path: &Path) -> OutputResult<usize>;
}
