//! Paginated-listing walker
//!
//! Advances through a rendered listing one page at a time on a single leased render
//! session. Only entries not yielded on an earlier page are passed on, so listings
//! that reorder between pages do not produce duplicates.
//!
//! The walk ends when:
//! - the page-count ceiling is reached
//! - a page renders without entries, or without the configured marker heading
//! - there is no next page (next-link pagination)
//! - a page brings no new entries and has the same entry count as the previous one
//! - `max_idle_attempts` consecutive pages bring no new entries

use crate::config::{CrawlerConfig, ListingConfig, PaginationConfig};
use crate::crawler::Fetcher;
use crate::extract::{parse_listing, ListingEntry, ListingRules};
use crate::fetch::SessionLease;
use crate::storage::{FailureEntry, SkipEntry};
use crate::traverse::{
    CandidateKind, CandidateUrl, DiscoveryMethod, FrontierEntry, Hints, Incidents, Traversal,
    TraversalCursor,
};
use crate::url::{normalize_url, section_for, DocumentTypes};
use crate::ConfigError;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

pub struct ListingWalker {
    name: String,
    fetcher: Arc<Fetcher>,
    config: ListingConfig,
    rules: ListingRules,
    types: DocumentTypes,
    start: Url,
    section: String,
    max_pages: u32,
    max_idle: u32,

    /// Next page number to load, 1-based
    page: u32,
    next_url: Option<Url>,
    /// URL of the page whose entries are currently buffered
    buffered_page: Option<Url>,
    seen: HashSet<String>,
    previous_count: Option<usize>,
    idle: u32,
    pages_loaded: u32,
    buffer: VecDeque<CandidateUrl>,
    lease: Option<SessionLease>,
    done: bool,
    incidents: Incidents,
}

impl ListingWalker {
    pub fn new(
        index: usize,
        config: &ListingConfig,
        limits: &CrawlerConfig,
        types: DocumentTypes,
        fetcher: Arc<Fetcher>,
    ) -> Result<Self, ConfigError> {
        let start =
            normalize_url(&config.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            name: format!("listing-{}", index),
            fetcher,
            rules: ListingRules::new(config)?,
            config: config.clone(),
            types,
            section: section_for(&start),
            start,
            max_pages: limits.max_listing_pages.max(1),
            max_idle: limits.max_idle_attempts.max(1),
            page: 1,
            next_url: None,
            buffered_page: None,
            seen: HashSet::new(),
            previous_count: None,
            idle: 0,
            pages_loaded: 0,
            buffer: VecDeque::new(),
            lease: None,
            done: false,
            incidents: Incidents::default(),
        })
    }

    /// Number of listing pages rendered so far
    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }

    fn page_url(&self) -> Option<Url> {
        if self.page == 1 {
            return Some(self.start.clone());
        }

        match &self.config.pagination {
            PaginationConfig::Template { template } => {
                let url = template
                    .replace("{url}", &self.config.url)
                    .replace("{page}", &self.page.to_string());
                Url::parse(&url).ok()
            }
            PaginationConfig::NextLink { .. } => self.next_url.clone(),
        }
    }

    fn finish(&mut self, reason: &str) {
        tracing::debug!(
            "Listing {} finished after {} pages: {}",
            self.start,
            self.pages_loaded,
            reason
        );
        self.done = true;
        self.lease = None;
    }

    fn candidate(&self, entry: ListingEntry) -> CandidateUrl {
        let kind = if self.types.matches(&entry.url) {
            CandidateKind::Document
        } else {
            CandidateKind::Page
        };

        CandidateUrl {
            entry: FrontierEntry {
                url: entry.url,
                depth: 1,
                parent_section: self.section.clone(),
                method: DiscoveryMethod::Listing,
            },
            kind,
            hints: Hints {
                title: entry.title,
                date: entry.date,
                date_authoritative: true,
            },
        }
    }

    async fn load_next_page(&mut self) {
        if self.page > self.max_pages {
            tracing::info!("Listing {} reached the {}-page ceiling", self.start, self.max_pages);
            self.finish("page ceiling");
            return;
        }

        let Some(url) = self.page_url() else {
            self.finish("no next page");
            return;
        };

        if self.lease.is_none() {
            match self.fetcher.lease().await {
                Ok(lease) => self.lease = Some(lease),
                Err(e) => {
                    self.incidents.fetch_failed(&url, "listing", &e);
                    self.finish("no render session");
                    return;
                }
            }
        }

        let result = match self.lease.as_ref() {
            Some(lease) => self.fetcher.render_with(lease, &url).await,
            None => return,
        };
        self.pages_loaded += 1;

        let rendered = match result {
            Ok(page) => page,
            Err(e) => {
                self.incidents.fetch_failed(&url, "listing", &e);
                self.finish("render failed");
                return;
            }
        };

        let parsed = parse_listing(&rendered.html, &rendered.final_url, &self.rules);
        if !parsed.valid {
            self.finish("marker missing");
            return;
        }
        if parsed.entries.is_empty() {
            self.finish("empty page");
            return;
        }

        let count = parsed.entries.len();
        let seen = &mut self.seen;
        let fresh: Vec<ListingEntry> = parsed
            .entries
            .into_iter()
            .filter(|e| seen.insert(e.url.to_string()))
            .collect();

        tracing::debug!(
            "Listing page {} of {}: {} entries, {} new",
            self.page,
            self.start,
            count,
            fresh.len()
        );

        if fresh.is_empty() {
            self.idle += 1;
            if self.previous_count == Some(count) {
                self.finish("stable entry count");
                return;
            }
            if self.idle >= self.max_idle {
                self.finish("no new entries");
                return;
            }
        } else {
            self.idle = 0;
            for entry in fresh {
                let candidate = self.candidate(entry);
                self.buffer.push_back(candidate);
            }
        }

        self.previous_count = Some(count);
        self.next_url = parsed.next_url;
        self.buffered_page = Some(url);
        self.page += 1;
    }
}

#[async_trait]
impl Traversal for ListingWalker {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn next_candidate(&mut self) -> Option<CandidateUrl> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            if self.done || self.fetcher.is_cancelled() {
                return None;
            }
            self.load_next_page().await;
        }
    }

    fn rewind(&mut self, candidate: CandidateUrl) {
        self.buffer.push_front(candidate);
    }

    fn session(&self) -> Option<&SessionLease> {
        self.lease.as_ref()
    }

    /// Points at the page whose entries are still buffered, so nothing is lost on resume
    fn cursor(&self) -> TraversalCursor {
        if self.buffer.is_empty() {
            TraversalCursor::Listing {
                page: self.page,
                next_url: self.next_url.as_ref().map(Url::to_string),
            }
        } else {
            TraversalCursor::Listing {
                page: self.page.saturating_sub(1).max(1),
                next_url: self.buffered_page.as_ref().map(Url::to_string),
            }
        }
    }

    fn restore(&mut self, cursor: TraversalCursor) {
        if let TraversalCursor::Listing { page, next_url } = cursor {
            tracing::info!("Resuming listing {} at page {}", self.start, page);
            self.page = page.max(1);
            self.next_url = next_url.and_then(|u| Url::parse(&u).ok());
        }
    }

    fn drain_skips(&mut self) -> Vec<SkipEntry> {
        self.incidents.take_skips()
    }

    fn drain_failures(&mut self) -> Vec<FailureEntry> {
        self.incidents.take_failures()
    }
}
