//! Harvester - main harvest orchestration logic
//!
//! This module contains the run loop that coordinates all aspects of a harvest:
//! - Opening storage and creating the run
//! - Building one traversal per configured strategy and restoring saved cursors
//! - Running every strategy as its own task, feeding candidates through the pipeline
//! - Draining skip and failure logs, saving cursors, handling cancellation
//! - Finishing the run with its status and summary

use crate::config::{AuthorityConfig, Config, HeadMetaRules};
use crate::crawler::pipeline::{AuthorityContext, Pipeline};
use crate::crawler::{DomainLimiter, Fetcher, RunLog, RunSummary};
use crate::download::DownloadManager;
use crate::extract::{build_extractor, HeadMetaExtractor, MetadataExtractor};
use crate::fetch::{FetchAdapter, HttpFetchAdapter, RetryPolicy, SessionPool};
use crate::ledger::DedupLedger;
use crate::output::{RecordSink, SqliteRecordSink};
use crate::storage::{lock, open_storage, share, RunStatus, SharedStorage, Storage};
use crate::traverse::{
    FeedWalker, LinkCrawler, ListingWalker, SitemapWalker, Traversal, TraversalCursor,
};
use crate::url::DocumentTypes;
use crate::{ConfigError, HarvestError};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Candidates processed between two cursor saves
const CURSOR_INTERVAL: u64 = 10;

/// Main harvest coordinator
pub struct Harvester {
    config: Arc<Config>,
    storage: SharedStorage,
    fetcher: Arc<Fetcher>,
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn RecordSink>,
    log: Arc<RunLog>,
    run_id: i64,
    fresh: bool,
}

impl Harvester {
    /// Opens the configured database and builds the HTTP stack
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    /// * `fresh` - Ignore and clear saved traversal cursors
    /// * `cancel` - Run-level cancellation signal
    pub fn new(
        config: Config,
        config_hash: &str,
        fresh: bool,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let adapter = Arc::new(HttpFetchAdapter::from_config(&config.user_agent)?);
        Self::with_components(config, config_hash, fresh, share(storage), adapter, cancel)
    }

    /// Builds a harvester over explicit storage and fetch adapter
    pub fn with_components(
        config: Config,
        config_hash: &str,
        fresh: bool,
        storage: SharedStorage,
        adapter: Arc<dyn FetchAdapter>,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        let run_id = {
            let mut storage = lock(&storage)?;
            if fresh {
                storage.clear_all_cursors()?;
            }
            storage.create_run(config_hash)?
        };

        let sessions = SessionPool::shared(config.crawler.render_sessions.max(1) as usize, adapter.clone());
        let fetcher = Arc::new(Fetcher::new(
            adapter,
            sessions,
            DomainLimiter::from_config(&config.crawler),
            RetryPolicy::from(&config.retry),
            cancel,
        ));

        let ledger = Arc::new(DedupLedger::new(storage.clone(), run_id));
        let downloads = Arc::new(DownloadManager::new(
            fetcher.clone(),
            ledger.clone(),
            storage.clone(),
            &config.output.download_dir,
        ));
        let sink: Arc<dyn RecordSink> = Arc::new(SqliteRecordSink::new(storage.clone(), run_id));
        let log = Arc::new(RunLog::new());
        let pipeline = Arc::new(Pipeline::new(
            ledger,
            downloads,
            fetcher.clone(),
            sink.clone(),
            storage.clone(),
            log.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            storage,
            fetcher,
            pipeline,
            sink,
            log,
            run_id,
            fresh,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.fetcher.cancel_token()
    }

    /// Runs every configured strategy to completion or cancellation
    ///
    /// Strategies run concurrently; requests to one domain are still bounded by the
    /// politeness limiter. The first fatal error cancels the remaining strategies and
    /// is returned after the run has been marked failed.
    pub async fn run(&self) -> Result<RunSummary, HarvestError> {
        tracing::info!(
            "Starting harvest run {} ({} authorities, {} seeds)",
            self.run_id,
            self.config.authorities.len(),
            self.config.seed_count()
        );
        let start_time = Instant::now();

        let mut tasks = JoinSet::new();
        for authority in &self.config.authorities {
            let ctx = Arc::new(self.authority_context(authority)?);
            for mut traversal in self.build_traversals(authority)? {
                self.restore_cursor(&authority.name, traversal.as_mut())?;
                tasks.spawn(run_strategy(StrategyTask {
                    authority: authority.name.clone(),
                    ctx: ctx.clone(),
                    traversal,
                    pipeline: self.pipeline.clone(),
                    storage: self.storage.clone(),
                    log: self.log.clone(),
                    cancel: self.cancel_token().clone(),
                    run_id: self.run_id,
                }));
            }
        }

        let mut fatal: Option<HarvestError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| HarvestError::Task(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                tracing::error!("Strategy aborted: {}", e);
                if fatal.is_none() {
                    self.cancel_token().cancel();
                    fatal = Some(e);
                }
            }
        }

        let summary = self.log.summary();
        let status = match (&fatal, self.cancel_token().is_cancelled()) {
            (Some(_), _) => RunStatus::Failed,
            (None, true) => RunStatus::Interrupted,
            (None, false) => RunStatus::Completed,
        };
        let summary_json = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
        lock(&self.storage)?.finish_run(self.run_id, status, &summary_json)?;

        tracing::info!(
            "Run {} {} in {:.1}s: {} records, {} artifacts, {} failures",
            self.run_id,
            status.to_db_string(),
            start_time.elapsed().as_secs_f64(),
            summary.records_persisted,
            summary.artifacts_stored,
            summary.failures
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn authority_context(&self, authority: &AuthorityConfig) -> Result<AuthorityContext, ConfigError> {
        let extractor: Arc<dyn MetadataExtractor> = match &authority.rules {
            Some(rules) => Arc::from(build_extractor(rules)?),
            None => Arc::new(HeadMetaExtractor::new(&HeadMetaRules {
                series_meta: None,
                reference_meta: None,
            })),
        };

        Ok(AuthorityContext {
            name: authority.name.clone(),
            extractor,
            types: DocumentTypes::new(&authority.document_types),
            download_attachments: authority.download_attachments,
            archive_pages: authority.archive_pages,
        })
    }

    fn build_traversals(
        &self,
        authority: &AuthorityConfig,
    ) -> Result<Vec<Box<dyn Traversal>>, ConfigError> {
        let types = DocumentTypes::new(&authority.document_types);
        let mut traversals: Vec<Box<dyn Traversal>> = Vec::new();

        for (index, listing) in authority.listing.iter().enumerate() {
            traversals.push(Box::new(ListingWalker::new(
                index,
                listing,
                &self.config.crawler,
                types.clone(),
                self.fetcher.clone(),
            )?));
        }

        if !authority.sitemaps.is_empty() {
            traversals.push(Box::new(SitemapWalker::new(
                &authority.sitemaps,
                types.clone(),
                authority.sitemap_documents_only,
                self.fetcher.clone(),
            )?));
        }

        if !authority.feeds.is_empty() {
            traversals.push(Box::new(FeedWalker::new(
                &authority.feeds,
                types.clone(),
                self.fetcher.clone(),
            )?));
        }

        if let Some(crawl) = &authority.crawl {
            traversals.push(Box::new(LinkCrawler::new(
                crawl,
                &authority.domain,
                self.config.crawler.max_depth,
                types,
                self.fetcher.clone(),
            )?));
        }

        Ok(traversals)
    }

    fn restore_cursor(&self, authority: &str, traversal: &mut dyn Traversal) -> Result<(), HarvestError> {
        if self.fresh {
            return Ok(());
        }

        let name = traversal.name();
        let Some(json) = lock(&self.storage)?.load_cursor(authority, &name)? else {
            return Ok(());
        };

        match TraversalCursor::from_json(&json) {
            Ok(cursor) => {
                tracing::info!("Restoring saved position for {}/{}", authority, name);
                traversal.restore(cursor);
            }
            Err(e) => tracing::warn!("Ignoring unreadable cursor for {}/{}: {}", authority, name, e),
        }
        Ok(())
    }
}

/// Everything one strategy task owns
struct StrategyTask {
    authority: String,
    ctx: Arc<AuthorityContext>,
    traversal: Box<dyn Traversal>,
    pipeline: Arc<Pipeline>,
    storage: SharedStorage,
    log: Arc<RunLog>,
    cancel: CancellationToken,
    run_id: i64,
}

impl StrategyTask {
    /// Moves collected skips and failures into storage
    fn drain_incidents(&mut self) -> Result<(), HarvestError> {
        let skips = self.traversal.drain_skips();
        let failures = self.traversal.drain_failures();
        if skips.is_empty() && failures.is_empty() {
            return Ok(());
        }

        let mut storage = lock(&self.storage)?;
        for skip in &skips {
            storage.record_skip(skip, self.run_id)?;
        }
        for failure in &failures {
            storage.record_failure(failure, self.run_id)?;
        }
        self.log.skips(skips.len());
        self.log.failures(failures.len());
        Ok(())
    }

    fn save_cursor(&self, cursor: &TraversalCursor) -> Result<(), HarvestError> {
        let name = self.traversal.name();
        match cursor.to_json() {
            Ok(json) => lock(&self.storage)?.save_cursor(&self.authority, &name, &json)?,
            Err(e) => tracing::warn!("Could not serialize cursor for {}/{}: {}", self.authority, name, e),
        }
        Ok(())
    }
}

/// Pulls candidates from one traversal in discovery order until it is exhausted
///
/// A candidate interrupted by cancellation is handed back to the traversal before the
/// cursor is saved, so the next run starts with it.
async fn run_strategy(mut task: StrategyTask) -> Result<(), HarvestError> {
    let name = task.traversal.name();
    tracing::info!("Starting {}/{}", task.authority, name);

    let mut processed: u64 = 0;
    let mut interrupted = false;

    loop {
        if task.cancel.is_cancelled() {
            interrupted = true;
            break;
        }

        let Some(candidate) = task.traversal.next_candidate().await else {
            interrupted = task.cancel.is_cancelled();
            break;
        };

        let result = {
            let session = task.traversal.session();
            task.pipeline.process_on(&task.ctx, &candidate, session).await
        };
        match result {
            Ok(outcome) => tracing::trace!("{} -> {:?}", candidate.url(), outcome),
            Err(HarvestError::Cancelled) => {
                task.traversal.rewind(candidate);
                interrupted = true;
                break;
            }
            Err(e) => {
                task.drain_incidents()?;
                return Err(e);
            }
        }

        processed += 1;
        task.drain_incidents()?;

        if processed % CURSOR_INTERVAL == 0 {
            task.save_cursor(&task.traversal.cursor())?;
            let summary = task.log.summary();
            tracing::info!(
                "Progress {}/{}: {} candidates, {} records, {} artifacts",
                task.authority,
                name,
                processed,
                summary.records_persisted,
                summary.artifacts_stored
            );
        }
    }

    task.drain_incidents()?;

    if interrupted {
        task.save_cursor(&task.traversal.cursor())?;
        tracing::info!("{}/{} interrupted after {} candidates", task.authority, name, processed);
    } else {
        lock(&task.storage)?.clear_cursor(&task.authority, &name)?;
        tracing::info!("{}/{} complete: {} candidates", task.authority, name, processed);
    }
    Ok(())
}
