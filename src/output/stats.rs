//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! dataset statistics and run summaries.

use crate::crawler::RunSummary;
use crate::storage::{RunRecord, Storage, StorageResult};

/// Dataset statistics summary
#[derive(Debug, Clone)]
pub struct DatasetStatistics {
    /// Number of persisted document records
    pub documents: u64,

    /// Number of distinct stored artifacts
    pub artifacts: u64,

    /// Number of URLs in the SeenSet
    pub seen_urls: u64,

    /// Artifact counts per year bucket, ascending by bucket
    pub artifacts_by_year: Vec<(String, u64)>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<DatasetStatistics> {
    Ok(DatasetStatistics {
        documents: storage.count_documents()?,
        artifacts: storage.count_artifacts()?,
        seen_urls: storage.count_seen()?,
        artifacts_by_year: storage.count_artifacts_by_year()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &DatasetStatistics) {
    println!("=== Dataset Statistics ===\n");

    println!("Overview:");
    println!("  Document records: {}", stats.documents);
    println!("  Stored artifacts: {}", stats.artifacts);
    println!("  Seen URLs: {}", stats.seen_urls);
    println!();

    if !stats.artifacts_by_year.is_empty() {
        println!("Artifacts by Year:");
        for (year, count) in &stats.artifacts_by_year {
            println!("  {}: {}", year, count);
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        if let Some(summary) = run
            .summary
            .as_deref()
            .and_then(|s| serde_json::from_str::<RunSummary>(s).ok())
        {
            println!();
            print_run_summary(&summary);
        }
    }
}

/// Prints the outcome of one run
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Run Summary ===");
    println!("  Candidates: {}", summary.candidates);
    println!(
        "  Records persisted: {} ({} already present)",
        summary.records_persisted, summary.records_existing
    );
    println!(
        "  Artifacts stored: {} ({} deduplicated by checksum)",
        summary.artifacts_stored, summary.artifacts_deduplicated
    );
    println!("  Already seen: {}", summary.already_seen);
    println!("  Skips: {}", summary.skips);
    println!("  Failures: {}", summary.failures);
}
