//! Traversal strategies
//!
//! Every strategy produces a lazy, discovery-ordered sequence of [`CandidateUrl`]s
//! through the [`Traversal`] trait and can be suspended into a [`TraversalCursor`]
//! and restarted from it. Per-URL problems never end a traversal: they are collected
//! as skips or failures and drained by the coordinator.

mod crawl;
mod feed;
mod listing;
mod sitemap;

pub use crawl::LinkCrawler;
pub use feed::{parse_feed, FeedError, FeedItem, FeedWalker};
pub use listing::ListingWalker;
pub use sitemap::{parse_sitemap, SitemapDocument, SitemapEntry, SitemapError, SitemapWalker};

use crate::fetch::{FetchError, SessionLease};
use crate::storage::{FailureEntry, SkipEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// How a frontier entry was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Listing,
    Sitemap,
    Feed,
    LinkCrawl,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Sitemap => "sitemap",
            Self::Feed => "feed",
            Self::LinkCrawl => "crawl",
        }
    }
}

/// A URL waiting to be processed within one traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
    /// Section of the page the URL was found on; fixed at discovery time
    pub parent_section: String,
    pub method: DiscoveryMethod,
}

/// What the pipeline should do with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// A record page: render, extract metadata, download attachments
    Page,
    /// A binary document: download directly
    Document,
}

/// Metadata found alongside a URL during discovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    pub title: Option<String>,
    pub date: Option<String>,
    /// The date replaces whatever the record page says
    pub date_authoritative: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub entry: FrontierEntry,
    pub kind: CandidateKind,
    pub hints: Hints,
}

impl CandidateUrl {
    pub fn url(&self) -> &Url {
        &self.entry.url
    }

    /// Artifacts from recursive crawling are bucketed by section, everything else by year
    pub fn bucket_by_section(&self) -> bool {
        self.entry.method == DiscoveryMethod::LinkCrawl
    }
}

/// Resumable position of a traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TraversalCursor {
    Listing {
        /// Next page number to load
        page: u32,
        /// Next-page target, for next-link pagination
        next_url: Option<String>,
    },
    Sitemap {
        /// Sitemap documents already fully walked
        completed: Vec<String>,
    },
    Feed {
        completed: Vec<String>,
    },
    Crawl {
        /// Frontier pages not yet visited, with their depth
        pending: Vec<(String, u32)>,
        visited: Vec<String>,
    },
}

impl TraversalCursor {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Common interface of all traversal strategies
#[async_trait]
pub trait Traversal: Send {
    /// Identifier of this traversal within its authority, e.g. `listing-0`
    fn name(&self) -> String;

    /// Next candidate in discovery order, or `None` once the traversal is exhausted
    /// or the run was cancelled
    async fn next_candidate(&mut self) -> Option<CandidateUrl>;

    fn cursor(&self) -> TraversalCursor;

    /// Hands back a candidate that was pulled but not processed, so that it is
    /// yielded again and covered by [`cursor`](Self::cursor)
    fn rewind(&mut self, candidate: CandidateUrl);

    /// Render session this traversal holds between pulls, if any
    ///
    /// Record pages found by the traversal are rendered on it instead of leasing a
    /// second session from the same pool.
    fn session(&self) -> Option<&SessionLease> {
        None
    }

    /// Continues from a saved position; cursors of another strategy are ignored
    fn restore(&mut self, cursor: TraversalCursor);

    fn drain_skips(&mut self) -> Vec<SkipEntry>;

    fn drain_failures(&mut self) -> Vec<FailureEntry>;
}

/// Skips and failures collected by a traversal until the coordinator drains them
#[derive(Debug, Default)]
pub(crate) struct Incidents {
    skips: Vec<SkipEntry>,
    failures: Vec<FailureEntry>,
}

impl Incidents {
    pub(crate) fn skip(&mut self, url: &Url, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!("Skipping {}: {}", url, reason);
        self.skips.push(SkipEntry {
            url: url.to_string(),
            reason,
        });
    }

    /// Records a fetch failure; cancellation is not a failure
    pub(crate) fn fetch_failed(&mut self, url: &Url, stage: &str, error: &FetchError) {
        if matches!(error, FetchError::Cancelled) {
            return;
        }
        tracing::warn!("{} failed for {}: {}", stage, url, error);
        self.failures.push(FailureEntry {
            url: url.to_string(),
            stage: stage.to_string(),
            message: error.to_string(),
            attempts: error.attempts(),
        });
    }

    pub(crate) fn take_skips(&mut self) -> Vec<SkipEntry> {
        std::mem::take(&mut self.skips)
    }

    pub(crate) fn take_failures(&mut self) -> Vec<FailureEntry> {
        std::mem::take(&mut self.failures)
    }
}

/// Title hint for a document URL: its percent-decoded file name without extension
pub(crate) fn title_from_url(url: &Url) -> Option<String> {
    let name = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_encoding::percent_decode_str(name).decode_utf8_lossy();
    let stem = decoded
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(decoded.as_ref())
        .replace(['_', '+'], " ");
    let stem = stem.trim();
    (!stem.is_empty()).then(|| stem.to_string())
}
