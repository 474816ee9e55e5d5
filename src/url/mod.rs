//! URL handling module for Agency Harvester
//!
//! This module provides URL normalization (the dedup key), domain extraction,
//! wildcard domain matching, and the mapping of URLs onto the download layout.

mod domain;
mod layout;
mod matcher;
mod normalize;

pub use domain::extract_domain;
pub use layout::{
    extension, extension_for_media_type, file_name_for, sanitize_filename, section_for, year_bucket, DocumentTypes,
    DEFAULT_SECTION, UNKNOWN_YEAR,
};
pub use matcher::matches_wildcard;
pub use normalize::{normalize_relative, normalize_url};

use ::url::Url;

/// Returns true if the URL's host belongs to the given authority domain pattern
pub fn in_domain(pattern: &str, url: &Url) -> bool {
    extract_domain(url)
        .map(|d| matches_wildcard(pattern, &d))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_domain() {
        let url = Url::parse("https://www.trafa.se/vagtrafik/").unwrap();
        assert!(in_domain("*.trafa.se", &url));
        assert!(!in_domain("trafa.se", &url));
        assert!(!in_domain("*.scb.se", &url));
    }
}
