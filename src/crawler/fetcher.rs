//! Fetch facade used by traversals and downloads
//!
//! Every request made during a run goes through one [`Fetcher`], which combines:
//! - The per-domain politeness limiter
//! - The render session pool
//! - The shared bounded-backoff retry policy
//! - The run-level cancellation token

use crate::crawler::politeness::DomainLimiter;
use crate::fetch::{
    classify_status, FetchAdapter, FetchError, HttpResponse, RenderedPage, RetryPolicy,
    SessionLease, SessionPool,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

pub struct Fetcher {
    adapter: Arc<dyn FetchAdapter>,
    sessions: Arc<SessionPool>,
    limiter: DomainLimiter,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(
        adapter: Arc<dyn FetchAdapter>,
        sessions: Arc<SessionPool>,
        limiter: DomainLimiter,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            sessions,
            limiter,
            retry,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn limiter(&self) -> &DomainLimiter {
        &self.limiter
    }

    /// Waits for a free render session, or for cancellation
    pub async fn lease(&self) -> Result<SessionLease, FetchError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            lease = self.sessions.acquire() => lease,
        }
    }

    /// Renders a page on an already leased session
    ///
    /// A non-success status is turned into a transient or permanent error.
    pub async fn render_with(
        &self,
        lease: &SessionLease,
        url: &Url,
    ) -> Result<RenderedPage, FetchError> {
        let limiter = &self.limiter;
        self.retry
            .run(url, &self.cancel, move || async move {
                let _permit = limiter.acquire(&domain_key(url)).await?;
                let page = lease.render(url).await?;
                classify_status(url, page.status)?;
                Ok(page)
            })
            .await
    }

    /// Renders a single page on a session leased for just this call
    pub async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let lease = self.lease().await?;
        self.render_with(&lease, url).await
    }

    /// Fetches raw content without rendering
    pub async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let (limiter, adapter) = (&self.limiter, &self.adapter);
        self.retry
            .run(url, &self.cancel, move || async move {
                let _permit = limiter.acquire(&domain_key(url)).await?;
                let response = adapter.http_get(url).await?;
                classify_status(url, response.status)?;
                Ok(response)
            })
            .await
    }
}

fn domain_key(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_lowercase()
}
