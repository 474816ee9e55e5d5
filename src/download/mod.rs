//! Download Manager
//!
//! Fetches artifacts, hashes their content and writes each distinct content once.
//! Byte-identical content under a second URL resolves to the artifact stored first.

mod manager;

pub use manager::DownloadManager;

use crate::fetch::FetchError;
use crate::record::DownloadedArtifact;
use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(FetchError::Cancelled))
    }
}

/// Where an artifact belongs in the download layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    /// Authority name, the top-level directory
    pub source: String,
    /// Section of the originating page
    pub section: String,
    /// Free-text date used for the year bucket
    pub date_hint: Option<String>,
    /// Bucket by section instead of by year
    pub bucket_by_section: bool,
}

/// Result of storing an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    /// Content was new and has been written
    New(DownloadedArtifact),
    /// Content was already stored; nothing was written
    Duplicate(DownloadedArtifact),
}

impl Stored {
    pub fn artifact(&self) -> &DownloadedArtifact {
        match self {
            Self::New(a) | Self::Duplicate(a) => a,
        }
    }

    pub fn into_artifact(self) -> DownloadedArtifact {
        match self {
            Self::New(a) | Self::Duplicate(a) => a,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}
