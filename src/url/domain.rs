use url::Url;

/// Extracts the lowercase host from a URL
///
/// The port is not part of the domain, so politeness limits and same-domain checks
/// treat `agency.se:8443` and `agency.se` alike.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use agency_harvester::url::extract_domain;
///
/// let url = Url::parse("https://WWW.Agency.se/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("www.agency.se".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://www.scb.se/hitta-statistik/").unwrap();
        assert_eq!(extract_domain(&url), Some("www.scb.se".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_extract_uppercase_converted_to_lowercase() {
        let url = Url::parse("https://TRAFA.SE/").unwrap();
        assert_eq!(extract_domain(&url), Some("trafa.se".to_string()));
    }
}
