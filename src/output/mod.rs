//! Output module: the Sink Writer and reports
//!
//! This module handles:
//! - Persisting finalized records (upsert by source URL)
//! - The flat tabular (CSV) export
//! - Dataset statistics and run summaries

mod sqlite_output;
pub mod stats;
mod tabular;
mod traits;

pub use sqlite_output::SqliteRecordSink;
pub use stats::{load_statistics, print_run_summary, print_statistics, DatasetStatistics};
pub use tabular::{export_csv, write_csv};
pub use traits::{OutputError, OutputResult, RecordSink};
