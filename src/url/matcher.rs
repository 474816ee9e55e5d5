/// Checks if a domain matches an authority's domain pattern
///
/// `agency.se` matches only `agency.se`. `*.agency.se` matches the bare domain and any
/// subdomain, so `www.agency.se` and `stat.www.agency.se` both belong to it.
///
/// # Examples
///
/// ```
/// use agency_harvester::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.agency.se", "agency.se"));
/// assert!(matches_wildcard("*.agency.se", "www.agency.se"));
/// assert!(!matches_wildcard("*.agency.se", "otheragency.se"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map_or(false, |prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("trafa.se", "trafa.se"));
        assert!(!matches_wildcard("trafa.se", "www.trafa.se"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_wildcard("*.trafa.se", "trafa.se"));
        assert!(matches_wildcard("*.trafa.se", "www.trafa.se"));
        assert!(matches_wildcard("*.trafa.se", "a.b.trafa.se"));
    }

    #[test]
    fn test_wildcard_no_partial_match() {
        assert!(!matches_wildcard("*.trafa.se", "mytrafa.se"));
        assert!(!matches_wildcard("*.trafa.se", "trafa.se.evil.com"));
        assert!(!matches_wildcard("*.trafa.se", ""));
    }
}
