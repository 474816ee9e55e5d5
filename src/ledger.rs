//! Dedup Ledger
//!
//! The ledger owns the SeenSet. Every other component asks it whether a URL or a
//! content checksum is known; only the ledger writes seen entries.
//!
//! Concurrent workers use [`DedupLedger::try_reserve`], which checks the persistent
//! SeenSet and the in-flight set under one lock. A URL is committed as seen only after
//! its artifacts and record are durably stored; a dropped, uncommitted reservation
//! simply releases the URL again.

use crate::record::DownloadedArtifact;
use crate::storage::{lock, SharedStorage, Storage, StorageError, StorageResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Outcome of an atomic check-and-reserve
#[derive(Debug)]
pub enum Reserve {
    /// The caller owns the URL until the reservation is committed or dropped
    Reserved(Reservation),
    /// The URL is already in the SeenSet
    Seen,
    /// Another worker currently holds a reservation for the URL
    InFlight,
}

pub struct DedupLedger {
    storage: SharedStorage,
    in_flight: Mutex<HashSet<String>>,
    run_id: i64,
}

impl DedupLedger {
    pub fn new(storage: SharedStorage, run_id: i64) -> Self {
        Self {
            storage,
            in_flight: Mutex::new(HashSet::new()),
            run_id,
        }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn has_seen(&self, url: &str) -> StorageResult<bool> {
        lock(&self.storage)?.is_url_seen(url)
    }

    pub fn has_seen_checksum(&self, checksum: &str) -> StorageResult<bool> {
        lock(&self.storage)?.is_checksum_seen(checksum)
    }

    /// Adds a URL to the SeenSet; marking a URL twice is a no-op
    pub fn mark_seen(&self, url: &str, checksum: Option<&str>) -> StorageResult<()> {
        let inserted = lock(&self.storage)?.insert_seen(url, checksum, self.run_id)?;
        if inserted {
            tracing::trace!("Marked seen: {}", url);
        }
        Ok(())
    }

    /// Atomically checks that a URL is neither seen nor in flight, and reserves it
    pub fn try_reserve(self: &Arc<Self>, url: &str) -> StorageResult<Reserve> {
        let mut in_flight = self.in_flight()?;

        if in_flight.contains(url) {
            return Ok(Reserve::InFlight);
        }

        if lock(&self.storage)?.is_url_seen(url)? {
            return Ok(Reserve::Seen);
        }

        in_flight.insert(url.to_string());
        Ok(Reserve::Reserved(Reservation {
            ledger: Arc::clone(self),
            url: url.to_string(),
        }))
    }

    /// Returns the artifact already stored for a checksum, if any
    pub fn artifact_for_checksum(&self, checksum: &str) -> StorageResult<Option<DownloadedArtifact>> {
        lock(&self.storage)?.get_artifact_by_checksum(checksum)
    }

    /// Registers a durably written artifact
    ///
    /// If another artifact with the same checksum was registered first, that one is
    /// returned and `artifact` is not recorded.
    pub fn record_artifact(&self, artifact: &DownloadedArtifact) -> StorageResult<DownloadedArtifact> {
        let mut storage = lock(&self.storage)?;
        if storage.insert_artifact(artifact)? {
            return Ok(artifact.clone());
        }
        storage
            .get_artifact_by_checksum(&artifact.checksum)?
            .ok_or_else(|| {
                StorageError::Database(format!(
                    "artifact {} vanished after insert conflict",
                    artifact.checksum
                ))
            })
    }

    fn in_flight(&self) -> StorageResult<MutexGuard<'_, HashSet<String>>> {
        self.in_flight
            .lock()
            .map_err(|e| StorageError::Database(format!("ledger lock poisoned: {}", e)))
    }

    fn release(&self, url: &str) {
        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.remove(url);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(url);
            }
        }
    }
}

/// Exclusive claim on a URL for the lifetime of one pipeline pass
#[derive(Debug)]
pub struct Reservation {
    ledger: Arc<DedupLedger>,
    url: String,
}

impl Reservation {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Marks the reserved URL as seen, then releases the reservation
    pub fn commit(self, checksum: Option<&str>) -> StorageResult<()> {
        self.ledger.mark_seen(&self.url, checksum)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.release(&self.url);
    }
}

impl std::fmt::Debug for DedupLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupLedger")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{share, SqliteStorage};

    fn create_ledger() -> Arc<DedupLedger> {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();
        Arc::new(DedupLedger::new(share(storage), run_id))
    }

    fn artifact(checksum: &str, url: &str) -> DownloadedArtifact {
        DownloadedArtifact {
            local_path: format!("a/pdf/2024/{}.pdf", checksum),
            section: "general".to_string(),
            year_bucket: "2024".to_string(),
            checksum: checksum.to_string(),
            source_url: url.to_string(),
        }
    }

    #[test]
    fn test_mark_seen_is_idempotent() {
        let ledger = create_ledger();
        ledger.mark_seen("https://agency.se/a", None).unwrap();
        ledger.mark_seen("https://agency.se/a", Some("abc")).unwrap();
        assert!(ledger.has_seen("https://agency.se/a").unwrap());
        assert!(!ledger.has_seen_checksum("abc").unwrap());
    }

    #[test]
    fn test_reservation_blocks_second_reserve() {
        let ledger = create_ledger();

        let first = ledger.try_reserve("https://agency.se/a").unwrap();
        assert!(matches!(first, Reserve::Reserved(_)));
        assert!(matches!(
            ledger.try_reserve("https://agency.se/a").unwrap(),
            Reserve::InFlight
        ));

        drop(first);
        assert!(matches!(
            ledger.try_reserve("https://agency.se/a").unwrap(),
            Reserve::Reserved(_)
        ));
    }

    #[test]
    fn test_commit_marks_seen() {
        let ledger = create_ledger();

        match ledger.try_reserve("https://agency.se/a.pdf").unwrap() {
            Reserve::Reserved(r) => r.commit(Some("abc")).unwrap(),
            other => panic!("expected reservation, got {:?}", other),
        }

        assert!(ledger.has_seen("https://agency.se/a.pdf").unwrap());
        assert!(ledger.has_seen_checksum("abc").unwrap());
        assert!(matches!(
            ledger.try_reserve("https://agency.se/a.pdf").unwrap(),
            Reserve::Seen
        ));
    }

    #[test]
    fn test_dropped_reservation_leaves_nothing_marked() {
        let ledger = create_ledger();
        {
            let _reservation = ledger.try_reserve("https://agency.se/a").unwrap();
        }
        assert!(!ledger.has_seen("https://agency.se/a").unwrap());
    }

    #[test]
    fn test_record_artifact_first_wins() {
        let ledger = create_ledger();

        let first = ledger
            .record_artifact(&artifact("abc", "https://agency.se/1.pdf"))
            .unwrap();
        let second = ledger
            .record_artifact(&artifact("abc", "https://agency.se/2.pdf"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.source_url, "https://agency.se/1.pdf");
        assert!(ledger.has_seen_checksum("abc").unwrap());
    }

    #[test]
    fn test_concurrent_reserve_single_winner() {
        let ledger = create_ledger();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    match ledger.try_reserve("https://agency.se/race.pdf").unwrap() {
                        Reserve::Reserved(r) => {
                            r.commit(None).unwrap();
                            1
                        }
                        _ => 0,
                    }
                })
            })
            .collect();

        let winners: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(winners, 1);
    }
}
