//! reqwest-backed fetch adapter

use crate::config::UserAgentConfig;
use crate::fetch::{FetchAdapter, FetchError, HttpResponse, RenderedPage};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with the identifying user agent
///
/// # Example
///
/// ```no_run
/// use agency_harvester::config::UserAgentConfig;
/// use agency_harvester::fetch::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "AgencyHarvester".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain HTTP adapter: `render` is a GET of the server-side HTML
#[derive(Debug, Clone)]
pub struct HttpFetchAdapter {
    client: Client,
}

impl HttpFetchAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))
    }
}

/// Timeouts and connection problems are transient; redirect loops and builder
/// errors are permanent.
fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_redirect() || error.is_builder() {
        FetchError::permanent(url, error.to_string())
    } else if error.is_timeout() {
        FetchError::transient(url, "request timeout")
    } else if error.is_connect() {
        FetchError::transient(url, format!("connection failed: {}", error))
    } else {
        FetchError::transient(url, error.to_string())
    }
}

#[async_trait]
impl FetchAdapter for HttpFetchAdapter {
    async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let response = self.get(url).await?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = header_content_type(&response);
        let html = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        Ok(RenderedPage {
            html,
            final_url,
            status,
            content_type,
        })
    }

    async fn http_get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let response = self.get(url).await?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = header_content_type(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?
            .to_vec();

        Ok(HttpResponse {
            bytes,
            content_type,
            status,
            final_url,
        })
    }
}

fn header_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }

    #[tokio::test]
    async fn test_http_get_sends_user_agent_and_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.csv"))
            .and(header(
                "user-agent",
                "TestHarvester/1.0 (+https://example.com/about; admin@example.com)",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/csv")
                    .set_body_bytes(b"a,b\n1,2\n".to_vec()),
            )
            .mount(&server)
            .await;

        let adapter = HttpFetchAdapter::from_config(&create_test_config()).unwrap();
        let url = Url::parse(&format!("{}/data.csv", server.uri())).unwrap();
        let response = adapter.http_get(&url).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.bytes, b"a,b\n1,2\n");
        assert_eq!(response.media_type().as_deref(), Some("text/csv"));
    }

    #[tokio::test]
    async fn test_render_returns_error_status_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<h1>Not found</h1>"))
            .mount(&server)
            .await;

        let adapter = HttpFetchAdapter::from_config(&create_test_config()).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let page = adapter.render(&url).await.unwrap();

        assert_eq!(page.status, 404);
        assert!(page.html.contains("Not found"));
    }

    #[tokio::test]
    async fn test_render_reports_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7 << /Type /Catalog >>".to_vec()),
            )
            .mount(&server)
            .await;

        let adapter = HttpFetchAdapter::from_config(&create_test_config()).unwrap();
        let url = Url::parse(&format!("{}/r/download", server.uri())).unwrap();
        let page = adapter.render(&url).await.unwrap();

        assert_eq!(page.media_type().as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let adapter = HttpFetchAdapter::from_config(&create_test_config()).unwrap();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();
        let err = adapter.http_get(&url).await.unwrap_err();
        assert!(err.is_transient());
    }
}
