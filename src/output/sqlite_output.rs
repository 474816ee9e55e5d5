//! SQLite-backed record sink
//!
//! Records go straight into the `documents` table as they are produced, so a crashed
//! run keeps everything written before the crash.

use crate::output::tabular::export_csv;
use crate::output::traits::{OutputResult, RecordSink};
use crate::record::DocumentRecord;
use crate::storage::{lock, SharedStorage, Storage};
use std::path::Path;

pub struct SqliteRecordSink {
    storage: SharedStorage,
    run_id: i64,
}

impl SqliteRecordSink {
    /// Creates a sink that tags new records with `run_id`
    pub fn new(storage: SharedStorage, run_id: i64) -> Self {
        Self { storage, run_id }
    }
}

impl RecordSink for SqliteRecordSink {
    fn write(&self, record: &DocumentRecord) -> OutputResult<bool> {
        let inserted = lock(&self.storage)?.upsert_document(record, self.run_id)?;
        if !inserted {
            tracing::debug!("Record for {} already stored", record.source_url);
        }
        Ok(inserted)
    }

    fn link_artifact(&self, source_url: &str, checksum: &str) -> OutputResult<()> {
        lock(&self.storage)?.link_artifact(source_url, checksum)?;
        Ok(())
    }

    fn export(&self, path: &Path) -> OutputResult<usize> {
        let records = lock(&self.storage)?.list_documents()?;
        let rows = export_csv(path, &records)?;
        tracing::info!("Exported {} records to {}", rows, path.display());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{share, SqliteStorage};
    use tempfile::TempDir;

    fn sink() -> (SqliteRecordSink, SharedStorage) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();
        let storage = share(storage);
        (SqliteRecordSink::new(storage.clone(), run_id), storage)
    }

    fn record(url: &str, title: &str) -> DocumentRecord {
        DocumentRecord {
            title: title.to_string(),
            ..DocumentRecord::new(url)
        }
    }

    #[test]
    fn test_write_is_upsert_by_url() {
        let (sink, storage) = sink();

        assert!(sink.write(&record("https://a.se/r/1", "First")).unwrap());
        assert!(!sink.write(&record("https://a.se/r/1", "Second")).unwrap());

        let storage = lock(&storage).unwrap();
        assert_eq!(storage.count_documents().unwrap(), 1);
        assert_eq!(
            storage.get_document("https://a.se/r/1").unwrap().unwrap().title,
            "First"
        );
    }

    #[test]
    fn test_export_writes_all_records() {
        let (sink, _storage) = sink();
        sink.write(&record("https://a.se/r/1", "One")).unwrap();
        sink.write(&record("https://a.se/r/2", "Two")).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/records.csv");
        assert_eq!(sink.export(&path).unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("https://a.se/r/2"));
    }
}
