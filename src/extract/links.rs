//! Link discovery in rendered pages

use crate::extract::clean_text;
use crate::url::{normalize_relative, DocumentTypes};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A link found on a page, resolved and normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: Url,
    /// Visible link text, used as a title hint
    pub text: String,
}

/// Extracts all followable links from a page, in document order and without duplicates
///
/// Skipped: `javascript:`, `mailto:`, `tel:` and `data:` links, fragment-only links,
/// and anything that does not resolve to http(s).
pub fn extract_links(html: &str, base_url: &Url) -> Vec<DiscoveredLink> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };

        if seen.insert(url.to_string()) {
            links.push(DiscoveredLink {
                url,
                text: clean_text(element.text()),
            });
        }
    }

    links
}

/// Links whose path ends in an accepted document extension
pub fn extract_document_links(
    html: &str,
    base_url: &Url,
    types: &DocumentTypes,
) -> Vec<DiscoveredLink> {
    extract_links(html, base_url)
        .into_iter()
        .filter(|link| types.matches(&link.url))
        .collect()
}

/// Resolves an href against the page URL and normalizes it
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    normalize_relative(base_url, href).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://www.agency.se/statistik/regional/").unwrap()
    }

    #[test]
    fn test_resolves_relative_and_absolute() {
        let html = r#"<a href="/a">A</a><a href="b.pdf">B</a><a href="https://other.se/c">C</a>"#;
        let links = extract_links(html, &base_url());
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.agency.se/a",
                "https://www.agency.se/statistik/regional/b.pdf",
                "https://other.se/c"
            ]
        );
    }

    #[test]
    fn test_skips_special_schemes_and_fragments() {
        let html = r##"
            <a href="javascript:void(0)">x</a>
            <a href="MAILTO:a@b.se">x</a>
            <a href="tel:+46">x</a>
            <a href="data:text/html,hi">x</a>
            <a href="#top">x</a>
            <a href="  ">x</a>"##;
        assert!(extract_links(html, &base_url()).is_empty());
    }

    #[test]
    fn test_download_links_are_kept() {
        let html = r#"<a href="/files/r.pdf" download>Rapport</a>"#;
        assert_eq!(extract_links(html, &base_url()).len(), 1);
    }

    #[test]
    fn test_duplicates_collapse_after_normalization() {
        let html = r#"<a href="/a#x">1</a><a href="/a">2</a><a href="/a?utm_source=x">3</a>"#;
        let links = extract_links(html, &base_url());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "1");
    }

    #[test]
    fn test_document_links_filtered_by_type() {
        let html = r#"
            <a href="/files/Rapport 2024.PDF">  Rapport
               2024 </a>
            <a href="/files/data.xlsx">Data</a>
            <a href="/page.html">Page</a>"#;
        let types = DocumentTypes::new(["pdf"]);
        let links = extract_document_links(html, &base_url(), &types);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "Rapport 2024");
        assert_eq!(links[0].url.path(), "/files/Rapport%202024.PDF");
    }
}
