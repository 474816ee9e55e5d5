//! In-memory fetch adapter for unit tests

use crate::crawler::{DomainLimiter, Fetcher};
use crate::fetch::{FetchAdapter, FetchError, HttpResponse, RenderedPage, RetryPolicy, SessionPool};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Clone)]
pub(crate) struct StubResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Serves canned responses by exact URL; unknown URLs answer 404
#[derive(Default)]
pub(crate) struct StubAdapter {
    responses: Mutex<HashMap<String, StubResponse>>,
    requests: Mutex<Vec<String>>,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.set(url, 200, html.as_bytes(), Some("text/html; charset=utf-8"));
        self
    }

    pub fn bytes(self, url: &str, body: &[u8], content_type: &str) -> Self {
        self.set(url, 200, body, Some(content_type));
        self
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.set(url, status, b"", None);
        self
    }

    pub fn set(&self, url: &str, status: u16, body: &[u8], content_type: Option<&str>) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            StubResponse {
                status,
                body: body.to_vec(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| *r == url).count()
    }

    fn respond(&self, url: &Url) -> StubResponse {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or(StubResponse {
                status: 404,
                body: Vec::new(),
                content_type: None,
            })
    }
}

#[async_trait]
impl FetchAdapter for StubAdapter {
    async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let response = self.respond(url);
        Ok(RenderedPage {
            html: String::from_utf8_lossy(&response.body).into_owned(),
            final_url: url.clone(),
            status: response.status,
            content_type: response.content_type,
        })
    }

    async fn http_get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let response = self.respond(url);
        Ok(HttpResponse {
            bytes: response.body,
            content_type: response.content_type,
            status: response.status,
            final_url: url.clone(),
        })
    }
}

/// A fetcher over `adapter` with fast retries and no politeness delay
pub(crate) fn fetcher_for(adapter: Arc<StubAdapter>) -> Arc<Fetcher> {
    fetcher_with_sessions(adapter, 2)
}

pub(crate) fn fetcher_with_sessions(adapter: Arc<StubAdapter>, sessions: usize) -> Arc<Fetcher> {
    Arc::new(Fetcher::new(
        adapter.clone(),
        SessionPool::shared(sessions, adapter),
        DomainLimiter::new(4, Duration::ZERO),
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
        CancellationToken::new(),
    ))
}
