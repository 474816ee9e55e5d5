//! Recursive link crawler
//!
//! Breadth-first from the seeds. Links to documents (by extension) are yielded for
//! download wherever they point; HTML links are followed only within the authority
//! domain, the optional path scope and the depth limit. The visited set is filled at
//! enqueue time, so no URL is queued or yielded twice within a run.

use crate::config::LinkCrawlConfig;
use crate::crawler::Fetcher;
use crate::extract::{extract_links, DiscoveredLink};
use crate::storage::{FailureEntry, SkipEntry};
use crate::traverse::{
    title_from_url, CandidateKind, CandidateUrl, DiscoveryMethod, FrontierEntry, Hints,
    Incidents, Traversal, TraversalCursor,
};
use crate::url::{in_domain, normalize_url, section_for, DocumentTypes};
use crate::ConfigError;
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

pub struct LinkCrawler {
    fetcher: Arc<Fetcher>,
    domain: String,
    types: DocumentTypes,
    scope: Option<String>,
    max_depth: u32,
    exclude: Option<Regex>,

    queue: VecDeque<(Url, u32)>,
    visited: HashSet<String>,
    buffer: VecDeque<CandidateUrl>,
    /// Page whose documents are currently buffered
    current: Option<(Url, u32)>,
    pages_visited: u32,
    incidents: Incidents,
}

impl LinkCrawler {
    pub fn new(
        config: &LinkCrawlConfig,
        domain: &str,
        default_depth: u32,
        types: DocumentTypes,
        fetcher: Arc<Fetcher>,
    ) -> Result<Self, ConfigError> {
        let exclude = config
            .exclude
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let mut crawler = Self {
            fetcher,
            domain: domain.to_string(),
            types,
            scope: config.scope.clone(),
            max_depth: config.max_depth.unwrap_or(default_depth),
            exclude,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            buffer: VecDeque::new(),
            current: None,
            pages_visited: 0,
            incidents: Incidents::default(),
        };

        for seed in &config.seeds {
            let url = normalize_url(seed)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", seed, e)))?;
            if !crawler.visited.insert(url.to_string()) {
                continue;
            }
            if crawler.types.matches(&url) {
                let section = section_for(&url);
                crawler.buffer.push_back(crawler.document(url, 0, &section, None));
            } else {
                crawler.queue.push_back((url, 0));
            }
        }

        Ok(crawler)
    }

    /// Number of HTML pages rendered so far
    pub fn pages_visited(&self) -> u32 {
        self.pages_visited
    }

    fn excluded(&self, url: &Url) -> bool {
        self.exclude
            .as_ref()
            .map(|re| re.is_match(url.path()))
            .unwrap_or(false)
    }

    fn in_scope(&self, url: &Url) -> bool {
        in_domain(&self.domain, url)
            && self
                .scope
                .as_deref()
                .map(|scope| url.path().starts_with(scope))
                .unwrap_or(true)
    }

    fn document(&self, url: Url, depth: u32, section: &str, link_text: Option<&str>) -> CandidateUrl {
        let title = link_text
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| title_from_url(&url));

        CandidateUrl {
            entry: FrontierEntry {
                url,
                depth,
                parent_section: section.to_string(),
                method: DiscoveryMethod::LinkCrawl,
            },
            kind: CandidateKind::Document,
            hints: Hints {
                title,
                ..Default::default()
            },
        }
    }

    async fn visit(&mut self, url: Url, depth: u32) {
        let page = match self.fetcher.render(&url).await {
            Ok(page) => page,
            Err(e) => {
                self.incidents.fetch_failed(&url, "crawl", &e);
                return;
            }
        };
        self.pages_visited += 1;

        let section = section_for(&url);
        let links = extract_links(&page.html, &page.final_url);
        let (mut documents, mut pages) = (0, 0);

        for DiscoveredLink { url: link, text } in links {
            if self.visited.contains(link.as_str()) || self.excluded(&link) {
                continue;
            }

            if self.types.matches(&link) {
                self.visited.insert(link.to_string());
                let candidate = self.document(link, depth + 1, &section, Some(&text));
                self.buffer.push_back(candidate);
                documents += 1;
            } else if depth < self.max_depth && self.in_scope(&link) {
                self.visited.insert(link.to_string());
                self.queue.push_back((link, depth + 1));
                pages += 1;
            }
        }

        tracing::debug!(
            "Crawled {} (depth {}): {} documents, {} pages queued",
            url,
            depth,
            documents,
            pages
        );
        self.current = Some((url, depth));
    }
}

#[async_trait]
impl Traversal for LinkCrawler {
    fn name(&self) -> String {
        "crawl".to_string()
    }

    async fn next_candidate(&mut self) -> Option<CandidateUrl> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            self.current = None;

            if self.fetcher.is_cancelled() {
                return None;
            }
            let (url, depth) = self.queue.pop_front()?;
            self.visit(url, depth).await;
        }
    }

    fn rewind(&mut self, candidate: CandidateUrl) {
        self.buffer.push_front(candidate);
    }

    /// A page with buffered documents goes back to the front of the frontier, and
    /// those documents are left out of the visited set
    fn cursor(&self) -> TraversalCursor {
        let buffered: HashSet<&str> = self.buffer.iter().map(|c| c.url().as_str()).collect();

        let mut pending: Vec<(String, u32)> = Vec::new();
        if !self.buffer.is_empty() {
            if let Some((url, depth)) = &self.current {
                pending.push((url.to_string(), *depth));
            }
        }
        pending.extend(self.queue.iter().map(|(u, d)| (u.to_string(), *d)));

        let visited = self
            .visited
            .iter()
            .filter(|v| !buffered.contains(v.as_str()))
            .cloned()
            .collect();

        TraversalCursor::Crawl { pending, visited }
    }

    fn restore(&mut self, cursor: TraversalCursor) {
        if let TraversalCursor::Crawl { pending, visited } = cursor {
            tracing::info!("Resuming crawl with {} pending pages", pending.len());
            self.queue = pending
                .into_iter()
                .filter_map(|(u, d)| Url::parse(&u).ok().map(|u| (u, d)))
                .collect();
            self.visited = visited.into_iter().collect();
            let visited = &self.visited;
            self.buffer.retain(|c| !visited.contains(c.url().as_str()));
        }
    }

    fn drain_skips(&mut self) -> Vec<SkipEntry> {
        self.incidents.take_skips()
    }

    fn drain_failures(&mut self) -> Vec<FailureEntry> {
        self.incidents.take_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::{fetcher_for, StubAdapter};

    const SEED: &str = "https://www.agency.se/statistik/";

    fn site() -> StubAdapter {
        StubAdapter::new()
            .page(
                SEED,
                r#"<a href="/statistik/fordon/">Fordon</a>
                   <a href="/files/a.pdf">Årsrapport</a>
                   <a href="https://other.se/b.pdf"></a>
                   <a href="https://other.se/page">Other</a>
                   <a href="/om-oss/">Om oss</a>
                   <a href="/statistik/123.abc.html">Generated</a>
                   <a href="/statistik/">Self</a>"#,
            )
            .page(
                "https://www.agency.se/statistik/fordon/",
                r#"<a href="c.xlsx">Data</a>
                   <a href="/files/a.pdf">Again</a>
                   <a href="/statistik/">Up</a>
                   <a href="deeper/">Deeper</a>"#,
            )
    }

    fn crawl_config(max_depth: u32) -> LinkCrawlConfig {
        LinkCrawlConfig {
            seeds: vec![SEED.to_string()],
            scope: Some("/statistik".to_string()),
            max_depth: Some(max_depth),
            exclude: Some(r"^/(statistik/)?\d+(\.[\da-f]+)?\.html$".to_string()),
        }
    }

    fn crawler(stub: Arc<StubAdapter>, max_depth: u32) -> LinkCrawler {
        LinkCrawler::new(
            &crawl_config(max_depth),
            "*.agency.se",
            3,
            DocumentTypes::new(["pdf", "xlsx"]),
            fetcher_for(stub),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_crawl_collects_documents_with_sections() {
        let stub = Arc::new(site());
        let mut crawler = crawler(stub.clone(), 1);

        let mut found = Vec::new();
        while let Some(c) = crawler.next_candidate().await {
            found.push((c.url().to_string(), c.entry.parent_section.clone(), c.hints.title.clone()));
        }

        assert_eq!(
            found,
            vec![
                (
                    "https://www.agency.se/files/a.pdf".to_string(),
                    "statistik".to_string(),
                    Some("Årsrapport".to_string())
                ),
                (
                    "https://other.se/b.pdf".to_string(),
                    "statistik".to_string(),
                    Some("b".to_string())
                ),
                (
                    "https://www.agency.se/statistik/fordon/c.xlsx".to_string(),
                    "statistik/fordon".to_string(),
                    Some("Data".to_string())
                ),
            ]
        );

        assert_eq!(crawler.pages_visited(), 2);
        assert_eq!(stub.request_count("https://other.se/page"), 0);
        assert_eq!(stub.request_count("https://www.agency.se/om-oss/"), 0);
        assert_eq!(stub.request_count("https://www.agency.se/statistik/123.abc.html"), 0);
        assert_eq!(stub.request_count("https://www.agency.se/statistik/fordon/deeper/"), 0);
        assert_eq!(stub.request_count(SEED), 1);
    }

    #[tokio::test]
    async fn test_depth_zero_only_scans_seeds() {
        let stub = Arc::new(site());
        let mut crawler = crawler(stub.clone(), 0);

        let mut count = 0;
        while crawler.next_candidate().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(crawler.pages_visited(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_recorded_and_crawl_continues() {
        let stub = Arc::new(site().status("https://www.agency.se/statistik/fordon/", 404));
        let mut crawler = crawler(stub, 1);

        let mut count = 0;
        while crawler.next_candidate().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        let failures = crawler.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "crawl");
    }

    #[tokio::test]
    async fn test_cursor_requeues_page_with_buffered_documents() {
        let stub = Arc::new(site());
        let mut crawler = crawler(stub.clone(), 1);

        crawler.next_candidate().await.unwrap();
        let cursor = crawler.cursor();
        let TraversalCursor::Crawl { pending, visited } = &cursor else {
            panic!("wrong cursor kind");
        };
        assert_eq!(pending[0], (SEED.to_string(), 0));
        assert!(!visited.contains(&"https://other.se/b.pdf".to_string()));

        let mut resumed = super::LinkCrawler::new(
            &crawl_config(1),
            "*.agency.se",
            3,
            DocumentTypes::new(["pdf", "xlsx"]),
            fetcher_for(stub),
        )
        .unwrap();
        resumed.restore(cursor);

        let mut urls = Vec::new();
        while let Some(c) = resumed.next_candidate().await {
            urls.push(c.url().to_string());
        }
        assert_eq!(
            urls,
            vec![
                "https://other.se/b.pdf",
                "https://www.agency.se/statistik/fordon/c.xlsx"
            ]
        );
    }

    #[tokio::test]
    async fn test_rewound_document_is_yielded_again_and_kept_in_cursor() {
        let stub = Arc::new(site());
        let mut crawler = crawler(stub, 1);

        crawler.next_candidate().await.unwrap();
        let last = crawler.next_candidate().await.unwrap();
        assert_eq!(last.url().as_str(), "https://other.se/b.pdf");
        crawler.rewind(last);

        let TraversalCursor::Crawl { pending, visited } = crawler.cursor() else {
            panic!("wrong cursor kind");
        };
        assert_eq!(pending[0], (SEED.to_string(), 0));
        assert!(visited.contains(&"https://www.agency.se/files/a.pdf".to_string()));
        assert!(!visited.contains(&"https://other.se/b.pdf".to_string()));

        let again = crawler.next_candidate().await.unwrap();
        assert_eq!(again.url().as_str(), "https://other.se/b.pdf");
    }

    #[test]
    fn test_invalid_exclude_rejected() {
        let mut config = crawl_config(1);
        config.exclude = Some("(".to_string());
        let stub = Arc::new(StubAdapter::new());
        assert!(matches!(
            LinkCrawler::new(&config, "agency.se", 3, DocumentTypes::new(["pdf"]), fetcher_for(stub)),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }
}
