//! Feed walker for RSS 2.0 and Atom syndication feeds

use crate::crawler::Fetcher;
use crate::storage::{FailureEntry, SkipEntry};
use crate::traverse::{
    title_from_url, CandidateKind, CandidateUrl, DiscoveryMethod, FrontierEntry, Hints,
    Incidents, Traversal, TraversalCursor,
};
use crate::url::{normalize_url, section_for, DocumentTypes};
use crate::ConfigError;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("malformed feed: {0}")]
    Malformed(String),

    #[error("not a feed: root element <{0}>")]
    NotAFeed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub link: String,
    pub title: Option<String>,
    pub date: Option<String>,
}

#[derive(Default)]
struct ItemBuilder {
    link: Option<String>,
    title: Option<String>,
    published: Option<String>,
    updated: Option<String>,
}

impl ItemBuilder {
    fn build(self) -> Option<FeedItem> {
        Some(FeedItem {
            link: self.link?,
            title: self.title,
            date: self.published.or(self.updated),
        })
    }
}

/// Href of an Atom `<link>` that points at the entry itself
fn atom_link(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().ok()?.trim().to_string();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") | Some("enclosure") => href,
        _ => None,
    }
}

/// Parses an RSS 2.0 or Atom document into its items, in document order
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, FeedError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut root: Option<String> = None;
    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| FeedError::Malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                root.get_or_insert_with(|| name.clone());
                match name.as_str() {
                    "item" | "entry" => current = Some(ItemBuilder::default()),
                    "link" => {
                        if let (Some(item), Some(href)) = (current.as_mut(), atom_link(&e)) {
                            item.link.get_or_insert(href);
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                root.get_or_insert_with(|| name.clone());
                if name == "link" {
                    if let (Some(item), Some(href)) = (current.as_mut(), atom_link(&e)) {
                        item.link.get_or_insert(href);
                    }
                }
            }
            Event::End(_) => {
                if let Some("item" | "entry") = stack.pop().as_deref() {
                    if let Some(item) = current.take().and_then(ItemBuilder::build) {
                        items.push(item);
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| FeedError::Malformed(e.to_string()))?;
                push_text(&stack, &text, current.as_mut());
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                push_text(&stack, &text, current.as_mut());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(FeedError::Malformed(format!("document ends inside <{}>", open)));
    }

    match root.as_deref() {
        Some("rss") | Some("feed") | Some("rdf") => Ok(items),
        Some(other) => Err(FeedError::NotAFeed(other.to_string())),
        None => Err(FeedError::Malformed("empty document".to_string())),
    }
}

fn push_text(stack: &[String], text: &str, item: Option<&mut ItemBuilder>) {
    let (Some(item), Some(field)) = (item, stack.last()) else {
        return;
    };
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    let slot = match field.as_str() {
        "title" => &mut item.title,
        // RSS <link> carries the URL as text
        "link" => &mut item.link,
        "pubdate" | "published" | "date" | "issued" => &mut item.published,
        "updated" | "modified" => &mut item.updated,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(text.to_string());
    } else if field == "title" {
        if let Some(existing) = slot.as_mut() {
            existing.push(' ');
            existing.push_str(text);
        }
    }
}

pub struct FeedWalker {
    fetcher: Arc<Fetcher>,
    types: DocumentTypes,
    pending: VecDeque<Url>,
    completed: Vec<String>,
    buffered_from: Option<String>,
    buffer: VecDeque<CandidateUrl>,
    incidents: Incidents,
}

impl FeedWalker {
    pub fn new(feeds: &[String], types: DocumentTypes, fetcher: Arc<Fetcher>) -> Result<Self, ConfigError> {
        let pending = feeds
            .iter()
            .map(|f| normalize_url(f).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", f, e))))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            fetcher,
            types,
            pending,
            completed: Vec::new(),
            buffered_from: None,
            buffer: VecDeque::new(),
            incidents: Incidents::default(),
        })
    }

    async fn walk_feed(&mut self, url: Url) {
        let response = match self.fetcher.get(&url).await {
            Ok(response) => response,
            Err(e) => {
                self.incidents.fetch_failed(&url, "feed", &e);
                return;
            }
        };

        self.completed.push(url.to_string());
        let items = match parse_feed(&response.bytes) {
            Ok(items) => items,
            Err(e) => {
                self.incidents.skip(&url, e.to_string());
                return;
            }
        };

        tracing::debug!("Feed {}: {} items", url, items.len());
        for item in items {
            let Ok(link) = response
                .final_url
                .join(&item.link)
                .map_err(|e| e.to_string())
                .and_then(|u| normalize_url(u.as_str()).map_err(|e| e.to_string()))
            else {
                tracing::debug!("Ignoring feed item link {}", item.link);
                continue;
            };

            let (kind, title) = if self.types.matches(&link) {
                (CandidateKind::Document, item.title.or_else(|| title_from_url(&link)))
            } else {
                (CandidateKind::Page, item.title)
            };

            self.buffer.push_back(CandidateUrl {
                entry: FrontierEntry {
                    parent_section: section_for(&link),
                    url: link,
                    depth: 0,
                    method: DiscoveryMethod::Feed,
                },
                kind,
                hints: Hints {
                    title,
                    date: item.date,
                    date_authoritative: false,
                },
            });
        }
        self.buffered_from = Some(url.to_string());
    }
}

#[async_trait]
impl Traversal for FeedWalker {
    fn name(&self) -> String {
        "feed".to_string()
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
            let url = self.pending.pop_front()?;
            if self.completed.contains(&url.to_string()) {
                continue;
            }
            self.walk_feed(url).await;
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
        TraversalCursor::Feed { completed }
    }

    fn restore(&mut self, cursor: TraversalCursor) {
        if let TraversalCursor::Feed { completed } = cursor {
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
