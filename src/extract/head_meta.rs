use crate::config::HeadMetaRules;
use crate::extract::{clean_text, MetadataExtractor, RawContent};
use crate::record::DocumentRecord;
use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

const TITLE_KEYS: &[&str] = &["og:title", "dc.title", "dcterms.title", "twitter:title"];
const DESCRIPTION_KEYS: &[&str] = &[
    "description",
    "og:description",
    "dc.description",
    "dcterms.description",
];
const DATE_KEYS: &[&str] = &[
    "article:published_time",
    "dc.date.issued",
    "dcterms.issued",
    "dc.date",
    "dcterms.date",
    "date",
];

/// Extractor for pages that publish their metadata as `<meta>` tags
pub struct HeadMetaExtractor {
    series_meta: Option<String>,
    reference_meta: Option<String>,
}

impl HeadMetaExtractor {
    pub fn new(rules: &HeadMetaRules) -> Self {
        Self {
            series_meta: rules.series_meta.as_ref().map(|m| m.to_lowercase()),
            reference_meta: rules.reference_meta.as_ref().map(|m| m.to_lowercase()),
        }
    }
}

/// Meta tags keyed by lowercased `name` or `property`; the first occurrence wins
fn collect_meta(document: &Html) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    let Ok(selector) = Selector::parse("meta[content]") else {
        return meta;
    };

    for element in document.select(&selector) {
        let attrs = element.value();
        let key = attrs.attr("name").or_else(|| attrs.attr("property"));
        if let (Some(key), Some(content)) = (key, attrs.attr("content")) {
            let content = content.trim();
            if !content.is_empty() {
                meta.entry(key.trim().to_lowercase())
                    .or_insert_with(|| content.to_string());
            }
        }
    }
    meta
}

fn first_of(meta: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| meta.get(*k).cloned())
}

impl MetadataExtractor for HeadMetaExtractor {
    fn extract(&self, raw: &RawContent<'_>, source_url: &Url) -> Option<DocumentRecord> {
        if !raw.is_markup() {
            return None;
        }

        let document = Html::parse_document(raw.body);
        let meta = collect_meta(&document);
        let lookup = |key: &Option<String>| {
            key.as_ref()
                .and_then(|k| meta.get(k).cloned())
                .unwrap_or_default()
        };

        let title = first_of(&meta, TITLE_KEYS).unwrap_or_else(|| {
            Selector::parse("title")
                .ok()
                .and_then(|s| document.select(&s).next().map(|el| clean_text(el.text())))
                .unwrap_or_default()
        });

        Some(DocumentRecord {
            title,
            series_id: lookup(&self.series_meta),
            reference_id: lookup(&self.reference_meta),
            description: first_of(&meta, DESCRIPTION_KEYS).unwrap_or_default(),
            date: first_of(&meta, DATE_KEYS).unwrap_or_default(),
            source_url: source_url.to_string(),
        })
    }
}
