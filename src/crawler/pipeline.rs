//! Candidate pipeline
//!
//! One pass per candidate: reserve the URL in the ledger, fetch and extract, store
//! artifacts, write the record, then commit the URL as seen. A URL is committed only
//! after everything it produced is durably stored; per-URL fetch and parse problems
//! are logged and recorded, and only storage, output and disk errors are returned.

use crate::crawler::{Fetcher, RunLog};
use crate::download::{ArtifactTarget, DownloadError, DownloadManager};
use crate::extract::{extract_document_links, MetadataExtractor, RawContent};
use crate::fetch::{FetchError, SessionLease};
use crate::ledger::{DedupLedger, Reservation, Reserve};
use crate::output::RecordSink;
use crate::record::DocumentRecord;
use crate::storage::{lock, FailureEntry, SharedStorage, SkipEntry, Storage};
use crate::traverse::{CandidateKind, CandidateUrl};
use crate::url::DocumentTypes;
use crate::HarvestError;
use std::sync::Arc;
use url::Url;

/// Per-authority settings the pipeline needs for every candidate
pub struct AuthorityContext {
    pub name: String,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub types: DocumentTypes,
    pub download_attachments: bool,
    pub archive_pages: bool,
}

/// What happened to one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Persisted,
    AlreadySeen,
    /// Another worker is processing the same URL right now
    InFlight,
    /// Fetch failed; recorded in the failure log
    Failed,
    /// Content could not be parsed; recorded in the skip log
    Skipped,
}

pub struct Pipeline {
    ledger: Arc<DedupLedger>,
    downloads: Arc<DownloadManager>,
    fetcher: Arc<Fetcher>,
    sink: Arc<dyn RecordSink>,
    storage: SharedStorage,
    log: Arc<RunLog>,
}

impl Pipeline {
    pub fn new(
        ledger: Arc<DedupLedger>,
        downloads: Arc<DownloadManager>,
        fetcher: Arc<Fetcher>,
        sink: Arc<dyn RecordSink>,
        storage: SharedStorage,
        log: Arc<RunLog>,
    ) -> Self {
        Self {
            ledger,
            downloads,
            fetcher,
            sink,
            storage,
            log,
        }
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub async fn process(
        &self,
        ctx: &AuthorityContext,
        candidate: &CandidateUrl,
    ) -> Result<Outcome, HarvestError> {
        self.process_on(ctx, candidate, None).await
    }

    /// Processes a candidate, rendering a record page on `session` when one is given
    pub async fn process_on(
        &self,
        ctx: &AuthorityContext,
        candidate: &CandidateUrl,
        session: Option<&SessionLease>,
    ) -> Result<Outcome, HarvestError> {
        self.log.candidate();
        let url = candidate.url();

        let reservation = match self.ledger.try_reserve(url.as_str())? {
            Reserve::Reserved(reservation) => reservation,
            Reserve::Seen => {
                tracing::trace!("Already seen: {}", url);
                self.log.already_seen();
                return Ok(Outcome::AlreadySeen);
            }
            Reserve::InFlight => {
                tracing::debug!("Already in flight: {}", url);
                self.log.already_seen();
                return Ok(Outcome::InFlight);
            }
        };

        match candidate.kind {
            CandidateKind::Document => self.process_document(ctx, candidate, reservation).await,
            CandidateKind::Page => self.process_page(ctx, candidate, reservation, session).await,
        }
    }

    async fn process_document(
        &self,
        ctx: &AuthorityContext,
        candidate: &CandidateUrl,
        reservation: Reservation,
    ) -> Result<Outcome, HarvestError> {
        let url = candidate.url();
        let target = target_for(ctx, candidate, candidate.hints.date.as_deref());

        let stored = match self.downloads.fetch_and_store(url, &target).await {
            Ok(stored) => stored,
            Err(DownloadError::Fetch(e)) => return self.fetch_failed(reservation, e),
            Err(e) => return Err(e.into()),
        };
        self.log.artifact(stored.is_new());

        let mut record = DocumentRecord::new(url.as_str());
        apply_hints(&mut record, candidate);
        self.persist(&record)?;

        let checksum = stored.into_artifact().checksum;
        self.sink.link_artifact(url.as_str(), &checksum)?;
        reservation.commit(Some(&checksum))?;
        Ok(Outcome::Persisted)
    }

    async fn process_page(
        &self,
        ctx: &AuthorityContext,
        candidate: &CandidateUrl,
        reservation: Reservation,
        session: Option<&SessionLease>,
    ) -> Result<Outcome, HarvestError> {
        let url = candidate.url();

        let rendered = match session {
            Some(lease) => self.fetcher.render_with(lease, url).await,
            None => self.fetcher.render(url).await,
        };
        let page = match rendered {
            Ok(page) => page,
            Err(e) => {
                if !matches!(e, FetchError::Cancelled) {
                    self.record_failure(url, "render", &e)?;
                }
                return self.fetch_failed(reservation, e);
            }
        };

        let media_type = page.media_type();
        let raw = RawContent::new(&page.html, media_type.as_deref());
        if !raw.markup_type() {
            if let Some(ext) = media_type.as_deref().and_then(|mt| ctx.types.extension_for(mt)) {
                tracing::debug!("{} serves a {} document, downloading it", url, ext);
                return self.process_document(ctx, candidate, reservation).await;
            }
        }

        let Some(mut record) = ctx.extractor.extract(&raw, url) else {
            let reason = format!(
                "content is not HTML or XML ({})",
                media_type.as_deref().unwrap_or("no content type")
            );
            self.record_skip(url, &reason)?;
            reservation.commit(None)?;
            return Ok(Outcome::Skipped);
        };
        apply_hints(&mut record, candidate);

        let date_hint = Some(record.date.as_str()).filter(|d| !d.is_empty());
        let target = target_for(ctx, candidate, date_hint);

        let archived = if ctx.archive_pages {
            let stored = self
                .downloads
                .store_bytes(url, page.html.as_bytes(), "html", &target)
                .await?;
            self.log.artifact(stored.is_new());
            Some(stored.into_artifact().checksum)
        } else {
            None
        };

        let attachments = if ctx.download_attachments {
            self.download_attachments(ctx, &page.html, &page.final_url, &target)
                .await?
        } else {
            Attachments::default()
        };

        self.persist(&record)?;

        if let Some(checksum) = &archived {
            self.sink.link_artifact(url.as_str(), checksum)?;
        }
        for (attachment, checksum) in attachments.stored {
            self.sink.link_artifact(url.as_str(), &checksum)?;
            attachment.commit(Some(&checksum))?;
        }

        if attachments.retry_later {
            tracing::info!("{} left unmarked so its failed attachments are retried", url);
            return Ok(Outcome::Persisted);
        }
        reservation.commit(archived.as_deref())?;
        Ok(Outcome::Persisted)
    }

    /// Downloads the document links of a record page
    ///
    /// Each attachment URL is reserved like any candidate and handed back with its
    /// checksum, to be committed once the record is written. A failed attachment does
    /// not fail the record, but a transient failure keeps the page from being marked
    /// seen.
    async fn download_attachments(
        &self,
        ctx: &AuthorityContext,
        html: &str,
        base: &Url,
        target: &ArtifactTarget,
    ) -> Result<Attachments, HarvestError> {
        let mut attachments = Attachments::default();

        for link in extract_document_links(html, base, &ctx.types) {
            let reservation = match self.ledger.try_reserve(link.url.as_str())? {
                Reserve::Reserved(reservation) => reservation,
                Reserve::Seen | Reserve::InFlight => continue,
            };

            match self.downloads.fetch_and_store(&link.url, target).await {
                Ok(stored) => {
                    self.log.artifact(stored.is_new());
                    attachments
                        .stored
                        .push((reservation, stored.into_artifact().checksum));
                }
                Err(e) if e.is_cancelled() => return Err(HarvestError::Cancelled),
                Err(DownloadError::Fetch(e)) => {
                    self.log.failures(1);
                    if matches!(e, FetchError::Permanent { .. }) {
                        reservation.commit(None)?;
                    } else {
                        attachments.retry_later = true;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(attachments)
    }

    fn persist(&self, record: &DocumentRecord) -> Result<(), HarvestError> {
        let inserted = self.sink.write(record)?;
        self.log.record(inserted);
        if inserted {
            tracing::info!("Recorded {} ({})", record.source_url, record.title);
        }
        Ok(())
    }

    /// Permanent failures are committed so later runs do not retry them; transient
    /// ones and cancellation release the URL
    fn fetch_failed(&self, reservation: Reservation, error: FetchError) -> Result<Outcome, HarvestError> {
        match error {
            FetchError::Cancelled => Err(HarvestError::Cancelled),
            FetchError::Permanent { .. } => {
                self.log.failures(1);
                reservation.commit(None)?;
                Ok(Outcome::Failed)
            }
            _ => {
                self.log.failures(1);
                Ok(Outcome::Failed)
            }
        }
    }

    fn record_failure(&self, url: &Url, stage: &str, error: &FetchError) -> Result<(), HarvestError> {
        tracing::warn!("{} failed for {}: {}", stage, url, error);
        lock(&self.storage)?.record_failure(
            &FailureEntry {
                url: url.to_string(),
                stage: stage.to_string(),
                message: error.to_string(),
                attempts: error.attempts(),
            },
            self.ledger.run_id(),
        )?;
        Ok(())
    }

    fn record_skip(&self, url: &Url, reason: &str) -> Result<(), HarvestError> {
        tracing::info!("Skipping {}: {}", url, reason);
        lock(&self.storage)?.record_skip(
            &SkipEntry {
                url: url.to_string(),
                reason: reason.to_string(),
            },
            self.ledger.run_id(),
        )?;
        self.log.skips(1);
        Ok(())
    }
}

/// Attachments of one record page
#[derive(Default)]
struct Attachments {
    /// Reservations to commit with their checksums once the record is written
    stored: Vec<(Reservation, String)>,
    /// At least one attachment failed in a way worth retrying on a later run
    retry_later: bool,
}

fn apply_hints(record: &mut DocumentRecord, candidate: &CandidateUrl) {
    record.apply_hints(
        candidate.hints.title.as_deref(),
        candidate.hints.date.as_deref(),
        candidate.hints.date_authoritative,
    );
}

fn target_for(ctx: &AuthorityContext, candidate: &CandidateUrl, date_hint: Option<&str>) -> ArtifactTarget {
    ArtifactTarget {
        source: ctx.name.clone(),
        section: candidate.entry.parent_section.clone(),
        date_hint: date_hint.map(str::to_string),
        bucket_by_section: candidate.bucket_by_section(),
    }
}
