//! Flat tabular export of document records

use crate::output::traits::OutputResult;
use crate::record::DocumentRecord;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct Row<'a> {
    title: &'a str,
    reference_id: &'a str,
    series_id: &'a str,
    description: &'a str,
    date: &'a str,
    url: &'a str,
}

impl<'a> From<&'a DocumentRecord> for Row<'a> {
    fn from(record: &'a DocumentRecord) -> Self {
        Self {
            title: &record.title,
            reference_id: &record.reference_id,
            series_id: &record.series_id,
            description: &record.description,
            date: &record.date,
            url: &record.source_url,
        }
    }
}

/// Writes records as CSV with a header row; returns the number of data rows
pub fn write_csv<W: Write>(writer: W, records: &[DocumentRecord]) -> OutputResult<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(Row::from(record))?;
    }
    if records.is_empty() {
        csv.write_record(["title", "reference_id", "series_id", "description", "date", "url"])?;
    }
    csv.flush()?;
    Ok(records.len())
}

/// Writes the export file, creating parent directories as needed
pub fn export_csv(path: &Path, records: &[DocumentRecord]) -> OutputResult<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), records)
}
