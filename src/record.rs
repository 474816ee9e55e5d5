//! Normalized records produced by a harvest

use serde::{Deserialize, Serialize};

/// Normalized metadata for one published document
///
/// `source_url` is the unique key within a dataset. Every other field may be empty:
/// a record with partial metadata is still persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,

    /// Issuing series id, e.g. "Rapport 2024:17"
    pub series_id: String,

    /// Internal filing / diary number
    pub reference_id: String,

    pub description: String,

    /// Publication date, verbatim in the source's own format
    pub date: String,

    pub source_url: String,
}

impl DocumentRecord {
    /// Creates a record with only the source URL set
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Default::default()
        }
    }

    /// Fills empty fields from hints supplied by the traversal
    ///
    /// A listing date is authoritative and replaces any extracted date.
    pub fn apply_hints(&mut self, title: Option<&str>, date: Option<&str>, date_authoritative: bool) {
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            if self.title.is_empty() {
                self.title = title.to_string();
            }
        }

        if let Some(date) = date.map(str::trim).filter(|d| !d.is_empty()) {
            if date_authoritative || self.date.is_empty() {
                self.date = date.to_string();
            }
        }
    }
}

/// A persisted artifact; immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedArtifact {
    /// Path relative to the download root
    pub local_path: String,
    pub section: String,
    pub year_bucket: String,
    /// Hex-encoded SHA-256 of the content
    pub checksum: String,
    /// First URL the content was seen under
    pub source_url: String,
}
