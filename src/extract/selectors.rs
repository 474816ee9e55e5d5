use crate::config::SelectorRules;
use crate::extract::{clean_text, parse_selector, MetadataExtractor, RawContent};
use crate::record::DocumentRecord;
use crate::ConfigError;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Extractor driven by CSS selectors and text labels
pub struct SelectorExtractor {
    title: Selector,
    series_label: Option<String>,
    reference_label: Option<String>,
    description: Vec<Selector>,
    date: Option<Selector>,
}

impl SelectorExtractor {
    pub fn new(rules: &SelectorRules) -> Result<Self, ConfigError> {
        Ok(Self {
            title: parse_selector(&rules.title)?,
            series_label: rules.series_label.clone(),
            reference_label: rules.reference_label.clone(),
            description: rules
                .description
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<_, _>>()?,
            date: rules.date.as_deref().map(parse_selector).transpose()?,
        })
    }

    fn first_text(document: &Html, selector: &Selector) -> String {
        document
            .select(selector)
            .next()
            .map(|el| clean_text(el.text()))
            .unwrap_or_default()
    }

    /// The first selector with any match contributes the joined text of all its matches
    fn description(&self, document: &Html) -> String {
        for selector in &self.description {
            let parts: Vec<String> = document
                .select(selector)
                .map(|el| clean_text(el.text()))
                .filter(|t| !t.is_empty())
                .collect();
            if !parts.is_empty() {
                return parts.join(" ");
            }
        }
        String::new()
    }
}

impl MetadataExtractor for SelectorExtractor {
    fn extract(&self, raw: &RawContent<'_>, source_url: &Url) -> Option<DocumentRecord> {
        if !raw.is_markup() {
            return None;
        }

        let document = Html::parse_document(raw.body);
        let strings = stripped_strings(document.root_element());
        let label = |label: &Option<String>| {
            label
                .as_deref()
                .and_then(|l| find_label_value(&strings, l))
                .unwrap_or_default()
        };

        Some(DocumentRecord {
            title: Self::first_text(&document, &self.title),
            series_id: label(&self.series_label),
            reference_id: label(&self.reference_label),
            description: self.description(&document),
            date: self
                .date
                .as_ref()
                .map(|s| Self::first_text(&document, s))
                .unwrap_or_default(),
            source_url: source_url.to_string(),
        })
    }
}

/// Trimmed, non-empty text nodes in document order, skipping script and style
fn stripped_strings(root: ElementRef<'_>) -> Vec<String> {
    root.descendants()
        .filter_map(|node| {
            let text = match node.value() {
                Node::Text(text) => text,
                _ => return None,
            };
            let in_code = node
                .parent()
                .and_then(|p| p.value().as_element())
                .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                .unwrap_or(false);
            if in_code {
                return None;
            }
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

/// Finds the value that follows a label among a page's text nodes
///
/// Matches either a node equal to the label, followed (after any lone `:` nodes) by
/// the value, or a node of the form `Label: value`.
pub fn find_label_value(strings: &[String], label: &str) -> Option<String> {
    let label_lower = label.to_lowercase();

    let next_value = |from: usize| {
        strings[from..]
            .iter()
            .map(|s| s.trim())
            .find(|s| *s != ":" && !s.is_empty())
            .map(str::to_string)
    };

    for (i, s) in strings.iter().enumerate() {
        if s.to_lowercase() == label_lower {
            return next_value(i + 1);
        }

        if let Some(after) = inline_value(s, &label_lower) {
            if !after.is_empty() && after != ":" {
                return Some(after.to_string());
            }
            return next_value(i + 1);
        }
    }

    None
}

/// The text after `Label:` when `s` starts with the label and its colon
fn inline_value<'s>(s: &'s str, label_lower: &str) -> Option<&'s str> {
    let colons = label_lower.matches(':').count();
    let (idx, _) = s.match_indices(':').nth(colons)?;
    (s[..idx].trim().to_lowercase() == label_lower).then(|| s[idx + 1..].trim())
}
