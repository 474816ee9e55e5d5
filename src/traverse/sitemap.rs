//! Sitemap walker
//!
//! Walks XML sitemaps, following a sitemap index one level deep. A document that fails
//! to parse is recorded as a skip and its siblings are still walked.

use crate::crawler::Fetcher;
use crate::storage::{FailureEntry, SkipEntry};
use crate::traverse::{
    title_from_url, CandidateKind, CandidateUrl, DiscoveryMethod, FrontierEntry, Hints,
    Incidents, Traversal, TraversalCursor,
};
use crate::url::{normalize_url, section_for, DocumentTypes};
use crate::ConfigError;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Sitemap index nesting that is still followed
const MAX_INDEX_LEVEL: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SitemapError {
    #[error("malformed sitemap segment: {0}")]
    Malformed(String),

    #[error("not a sitemap: root element <{0}>")]
    UnexpectedRoot(String),
}

/// A leaf `<url>` of a sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>`
    UrlSet(Vec<SitemapEntry>),
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),
}

/// Parses one sitemap document
pub fn parse_sitemap(bytes: &[u8]) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut root: Option<String> = None;

    let mut entries = Vec::new();
    let mut children = Vec::new();
    let mut loc: Option<String> = None;
    let mut lastmod: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            SitemapError::Malformed(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                root.get_or_insert_with(|| name.clone());
                if name == "url" || name == "sitemap" {
                    loc = None;
                    lastmod = None;
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                root.get_or_insert(name);
            }
            Event::End(_) => match stack.pop().as_deref() {
                Some("url") => {
                    if let Some(loc) = loc.take() {
                        entries.push(SitemapEntry {
                            loc,
                            lastmod: lastmod.take(),
                        });
                    }
                }
                Some("sitemap") => {
                    if let Some(loc) = loc.take() {
                        children.push(loc);
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SitemapError::Malformed(e.to_string()))?;
                push_text(&stack, &text, &mut loc, &mut lastmod);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                push_text(&stack, &text, &mut loc, &mut lastmod);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(SitemapError::Malformed(format!(
            "document ends inside <{}>",
            open
        )));
    }

    match root.as_deref() {
        Some("urlset") => Ok(SitemapDocument::UrlSet(entries)),
        Some("sitemapindex") => Ok(SitemapDocument::Index(children)),
        Some(other) => Err(SitemapError::UnexpectedRoot(other.to_string())),
        None => Err(SitemapError::Malformed("empty document".to_string())),
    }
}

fn push_text(stack: &[String], text: &str, loc: &mut Option<String>, lastmod: &mut Option<String>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let target = match stack.last().map(String::as_str) {
        Some("loc") => loc,
        Some("lastmod") => lastmod,
        _ => return,
    };
    target.get_or_insert_with(String::new).push_str(text);
}

pub struct SitemapWalker {
    fetcher: Arc<Fetcher>,
    types: DocumentTypes,
    documents_only: bool,

    pending: VecDeque<(Url, u32)>,
    /// Documents fully walked (or skipped as malformed)
    completed: Vec<String>,
    visited: HashSet<String>,
    /// Document whose entries are still buffered
    buffered_from: Option<String>,
    buffer: VecDeque<CandidateUrl>,
    incidents: Incidents,
}

impl SitemapWalker {
    pub fn new(
        sitemaps: &[String],
        types: DocumentTypes,
        documents_only: bool,
        fetcher: Arc<Fetcher>,
    ) -> Result<Self, ConfigError> {
        let pending = sitemaps
            .iter()
            .map(|s| {
                normalize_url(s)
                    .map(|url| (url, 0))
                    .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", s, e)))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            fetcher,
            types,
            documents_only,
            pending,
            completed: Vec::new(),
            visited: HashSet::new(),
            buffered_from: None,
            buffer: VecDeque::new(),
            incidents: Incidents::default(),
        })
    }

    fn complete(&mut self, url: &Url) {
        self.completed.push(url.to_string());
    }

    async fn walk_document(&mut self, url: Url, level: u32) {
        if !self.visited.insert(url.to_string()) {
            return;
        }

        let response = match self.fetcher.get(&url).await {
            Ok(response) => response,
            Err(e) => {
                self.incidents.fetch_failed(&url, "sitemap", &e);
                return;
            }
        };

        let document = match parse_sitemap(&response.bytes) {
            Ok(document) => document,
            Err(e) => {
                self.incidents.skip(&url, e.to_string());
                self.complete(&url);
                return;
            }
        };

        match document {
            SitemapDocument::Index(children) if level >= MAX_INDEX_LEVEL => {
                self.incidents.skip(
                    &url,
                    format!("nested sitemap index ({} children not followed)", children.len()),
                );
                self.complete(&url);
            }
            SitemapDocument::Index(children) => {
                tracing::debug!("Sitemap index {} lists {} sitemaps", url, children.len());
                for child in children {
                    match normalize_url(&child) {
                        Ok(child) => self.pending.push_back((child, level + 1)),
                        Err(e) => tracing::debug!("Ignoring sitemap location {}: {}", child, e),
                    }
                }
            }
            SitemapDocument::UrlSet(entries) => {
                let total = entries.len();
                for entry in entries {
                    if let Some(candidate) = self.candidate(entry) {
                        self.buffer.push_back(candidate);
                    }
                }
                tracing::debug!(
                    "Sitemap {}: {} of {} URLs accepted",
                    url,
                    self.buffer.len(),
                    total
                );
                self.buffered_from = Some(url.to_string());
                self.complete(&url);
            }
        }
    }

    fn candidate(&self, entry: SitemapEntry) -> Option<CandidateUrl> {
        let url = match normalize_url(&entry.loc) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Ignoring sitemap entry {}: {}", entry.loc, e);
                return None;
            }
        };

        let is_document = self.types.matches(&url);
        if self.documents_only && !is_document {
            return None;
        }

        let (kind, title) = if is_document {
            (CandidateKind::Document, title_from_url(&url))
        } else {
            (CandidateKind::Page, None)
        };

        Some(CandidateUrl {
            entry: FrontierEntry {
                parent_section: section_for(&url),
                url,
                depth: 0,
                method: DiscoveryMethod::Sitemap,
            },
            kind,
            hints: Hints {
                title,
                date: entry.lastmod,
                date_authoritative: false,
            },
        })
    }
}

#[async_trait]
impl Traversal for SitemapWalker {
    fn name(&self) -> String {
        "sitemap".to_string()
    }

    async fn next_candidate(&mut self) -> Option<CandidateUrl> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            self.buffered_from = None;

            if self.fetcher.is_cancelled() {
                return None;
            }
            let (url, level) = self.pending.pop_front()?;
            self.walk_document(url, level).await;
        }
    }

    fn rewind(&mut self, candidate: CandidateUrl) {
        self.buffer.push_front(candidate);
    }

    fn cursor(&self) -> TraversalCursor {
        let completed = self
            .completed
            .iter()
            .filter(|c| self.buffer.is_empty() || Some(*c) != self.buffered_from.as_ref())
            .cloned()
            .collect();
        TraversalCursor::Sitemap { completed }
    }

    fn restore(&mut self, cursor: TraversalCursor) {
        if let TraversalCursor::Sitemap { completed } = cursor {
            tracing::info!("Resuming sitemaps, {} documents already walked", completed.len());
            self.visited.extend(completed.iter().cloned());
            self.completed = completed;
        }
    }

    fn drain_skips(&mut self) -> Vec<SkipEntry> {
        self.incidents.take_skips()
    }

    fn drain_failures(&mut self) -> Vec<FailureEntry> {
        self.incidents.take_failures()
    }
}
