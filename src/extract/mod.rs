//! Metadata Extractor
//!
//! Each authority's [`SourceRules`] select one extractor variant. Extraction never
//! fails on missing fields: anything not found stays empty and the record is still
//! returned. Only content that is not markup at all yields `None`.

mod head_meta;
mod links;
mod listing;
mod selectors;

pub use head_meta::HeadMetaExtractor;
pub use links::{extract_document_links, extract_links, resolve_link, DiscoveredLink};
pub use listing::{parse_listing, ListingEntry, ListingPage, ListingRules};
pub use selectors::{find_label_value, SelectorExtractor};

use crate::config::SourceRules;
use crate::record::DocumentRecord;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Fetched content handed to an extractor
#[derive(Debug, Clone, Copy)]
pub struct RawContent<'a> {
    pub body: &'a str,
    /// Lowercased media type, if the transport reported one
    pub media_type: Option<&'a str>,
}

impl<'a> RawContent<'a> {
    pub fn new(body: &'a str, media_type: Option<&'a str>) -> Self {
        Self { body, media_type }
    }

    pub fn html(body: &'a str) -> Self {
        Self::new(body, Some("text/html"))
    }

    /// True unless the transport reported a media type other than HTML or XML
    pub fn markup_type(&self) -> bool {
        self.media_type
            .map(|mt| mt.contains("html") || mt.contains("xml"))
            .unwrap_or(true)
    }

    /// True if the content can be parsed as HTML or XML
    pub fn is_markup(&self) -> bool {
        self.markup_type() && self.body.contains('<')
    }
}

pub trait MetadataExtractor: Send + Sync {
    /// Extracts a record for `source_url`, or `None` if the content is not markup
    fn extract(&self, raw: &RawContent<'_>, source_url: &Url) -> Option<DocumentRecord>;
}

/// Builds the extractor variant selected by an authority's rules
pub fn build_extractor(rules: &SourceRules) -> Result<Box<dyn MetadataExtractor>, ConfigError> {
    Ok(match rules {
        SourceRules::Selectors(rules) => Box::new(SelectorExtractor::new(rules)?),
        SourceRules::HeadMeta(rules) => Box::new(HeadMetaExtractor::new(rules)),
    })
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Collapses runs of whitespace into single spaces and trims
pub(crate) fn clean_text<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
