//! Run counters shared by all strategy tasks

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counts of one harvest run, stored with the run as JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub candidates: u64,
    pub records_persisted: u64,
    /// Records whose URL was already present in the sink
    pub records_existing: u64,
    pub artifacts_stored: u64,
    /// Downloads whose content matched an already stored artifact
    pub artifacts_deduplicated: u64,
    /// Candidates skipped because the ledger had already seen them
    pub already_seen: u64,
    pub skips: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct RunLog {
    candidates: AtomicU64,
    records_persisted: AtomicU64,
    records_existing: AtomicU64,
    artifacts_stored: AtomicU64,
    artifacts_deduplicated: AtomicU64,
    already_seen: AtomicU64,
    skips: AtomicU64,
    failures: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidate(&self) {
        bump(&self.candidates, 1);
    }

    pub fn record(&self, inserted: bool) {
        if inserted {
            bump(&self.records_persisted, 1);
        } else {
            bump(&self.records_existing, 1);
        }
    }

    pub fn artifact(&self, new: bool) {
        if new {
            bump(&self.artifacts_stored, 1);
        } else {
            bump(&self.artifacts_deduplicated, 1);
        }
    }

    pub fn already_seen(&self) {
        bump(&self.already_seen, 1);
    }

    pub fn skips(&self, n: usize) {
        bump(&self.skips, n as u64);
    }

    pub fn failures(&self, n: usize) {
        bump(&self.failures, n as u64);
    }

    pub fn summary(&self) -> RunSummary {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            candidates: get(&self.candidates),
            records_persisted: get(&self.records_persisted),
            records_existing: get(&self.records_existing),
            artifacts_stored: get(&self.artifacts_stored),
            artifacts_deduplicated: get(&self.artifacts_deduplicated),
            already_seen: get(&self.already_seen),
            skips: get(&self.skips),
            failures: get(&self.failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let log = RunLog::new();
        log.candidate();
        log.candidate();
        log.record(true);
        log.record(false);
        log.artifact(true);
        log.artifact(false);
        log.artifact(false);
        log.already_seen();
        log.skips(2);
        log.failures(3);

        assert_eq!(
            log.summary(),
            RunSummary {
                candidates: 2,
                records_persisted: 1,
                records_existing: 1,
                artifacts_stored: 1,
                artifacts_deduplicated: 2,
                already_seen: 1,
                skips: 2,
                failures: 3,
            }
        );
    }

    #[test]
    fn test_summary_json() {
        let summary = RunSummary {
            records_persisted: 4,
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"records_persisted\":4"));
        assert_eq!(serde_json::from_str::<RunSummary>(&json).unwrap(), summary);
    }
}
