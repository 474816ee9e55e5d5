//! Fetch Adapter boundary
//!
//! A [`FetchAdapter`] renders pages (returning the settled DOM as HTML) and performs
//! plain HTTP downloads. The crate ships a reqwest-backed adapter; a headless browser
//! driver can be plugged in behind the same trait. Rendering goes through a
//! [`SessionPool`] so that the number of concurrently open render sessions stays
//! bounded, and every request is wrapped by the shared [`RetryPolicy`].

mod http;
mod retry;
mod session;

#[cfg(test)]
pub(crate) mod stub;

pub use http::{build_http_client, HttpFetchAdapter};
pub use retry::RetryPolicy;
pub use session::{SessionLease, SessionPool};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// A page rendered by a session
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    /// `Content-Type` of the response the page was rendered from
    pub content_type: Option<String>,
}

impl RenderedPage {
    pub fn media_type(&self) -> Option<String> {
        media_type(self.content_type.as_deref())
    }
}

/// Raw response of a plain HTTP fetch
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub status: u16,
    /// URL after redirects
    pub final_url: Url,
}

impl HttpResponse {
    /// Lowercased media type without parameters, e.g. `application/xml`
    pub fn media_type(&self) -> Option<String> {
        media_type(self.content_type.as_deref())
    }
}

/// Lowercased media type of a `Content-Type` value, without parameters
fn media_type(content_type: Option<&str>) -> Option<String> {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase())
        .filter(|ct| !ct.is_empty())
}

/// Errors produced while fetching
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts, 5xx, 429, connection resets: worth retrying
    #[error("transient fetch error for {url}: {message}")]
    Transient { url: String, message: String },

    /// 404, 410, malformed URL and similar: never retried
    #[error("permanent fetch error for {url}: {message}")]
    Permanent { url: String, message: String },

    #[error("giving up on {url} after {attempts} attempts: {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn transient(url: &Url, message: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(url: &Url, message: impl Into<String>) -> Self {
        Self::Permanent {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Number of attempts made before this error was returned
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// Maps an HTTP status to success, a transient error or a permanent error
pub fn classify_status(url: &Url, status: u16) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        408 | 425 | 429 | 500..=599 => Err(FetchError::transient(url, format!("HTTP {}", status))),
        _ => Err(FetchError::permanent(url, format!("HTTP {}", status))),
    }
}

/// Capability to render pages and fetch raw content
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Renders one page and returns the resulting DOM as HTML
    ///
    /// Non-success statuses are returned, not raised; network failures are errors.
    async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError>;

    /// Fetches raw bytes without rendering
    async fn http_get(&self, url: &Url) -> Result<HttpResponse, FetchError>;
}
