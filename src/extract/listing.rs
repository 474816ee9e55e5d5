//! Entry extraction for paginated publication listings

use crate::config::{ListingConfig, PaginationConfig};
use crate::extract::{clean_text, parse_selector, resolve_link};
use crate::ConfigError;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Compiled selectors for one listing
#[derive(Debug)]
pub struct ListingRules {
    entry: Selector,
    link: Selector,
    date: Option<Selector>,
    next: Option<Selector>,
    headings: Selector,
    categories: Vec<String>,
    marker: Option<String>,
}

impl ListingRules {
    pub fn new(config: &ListingConfig) -> Result<Self, ConfigError> {
        let next = match &config.pagination {
            PaginationConfig::NextLink { selector } => Some(parse_selector(selector)?),
            PaginationConfig::Template { .. } => None,
        };

        Ok(Self {
            entry: parse_selector(&config.entry)?,
            link: parse_selector(&config.link)?,
            date: config.date.as_deref().map(parse_selector).transpose()?,
            next,
            headings: parse_selector("h1, h2, h3")?,
            categories: config.categories.iter().map(|c| c.to_lowercase()).collect(),
            marker: config.marker.as_ref().map(|m| m.to_lowercase()),
        })
    }

    fn category_allowed(&self, url: &Url) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        url.path_segments()
            .and_then(|mut s| s.nth(1))
            .map(|seg| self.categories.iter().any(|c| c == &seg.to_lowercase()))
            .unwrap_or(false)
    }
}

/// One publication found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub url: Url,
    /// Listing date, verbatim
    pub date: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// False when a configured marker heading is missing
    pub valid: bool,
    pub entries: Vec<ListingEntry>,
    /// Target of the next-page affordance, if the page has one
    pub next_url: Option<Url>,
}

/// Parses one rendered listing page
pub fn parse_listing(html: &str, base_url: &Url, rules: &ListingRules) -> ListingPage {
    let document = Html::parse_document(html);

    let valid = match &rules.marker {
        Some(marker) => document
            .select(&rules.headings)
            .any(|h| clean_text(h.text()).to_lowercase().contains(marker.as_str())),
        None => true,
    };
    if !valid {
        return ListingPage::default();
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for container in document.select(&rules.entry) {
        let Some(link) = container.select(&rules.link).next() else {
            continue;
        };
        let Some(url) = link
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };

        if !rules.category_allowed(&url) || !seen.insert(url.to_string()) {
            continue;
        }

        let date = rules
            .date
            .as_ref()
            .and_then(|s| container.select(s).next())
            .map(|el| clean_text(el.text()))
            .filter(|d| !d.is_empty());
        let title = Some(clean_text(link.text())).filter(|t| !t.is_empty());

        entries.push(ListingEntry { url, date, title });
    }

    let next_url = rules
        .next
        .as_ref()
        .and_then(|s| document.select(s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve_link(href, base_url));

    ListingPage {
        valid,
        entries,
        next_url,
    }
}
