//! Per-domain politeness limits
//!
//! This module handles:
//! - Bounding in-flight requests per target domain
//! - Respecting a minimum delay between requests to the same domain

use crate::config::CrawlerConfig;
use crate::fetch::FetchError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Request bookkeeping for one domain
#[derive(Debug)]
struct DomainState {
    permits: Arc<Semaphore>,

    /// Earliest instant at which the next request may start
    next_slot: tokio::sync::Mutex<Option<Instant>>,

    request_count: std::sync::atomic::AtomicU64,
}

/// Held for the duration of one request
#[derive(Debug)]
pub struct DomainPermit {
    _permit: OwnedSemaphorePermit,
}

/// Limits concurrency and request rate per domain
#[derive(Debug)]
pub struct DomainLimiter {
    domains: Mutex<HashMap<String, Arc<DomainState>>>,
    max_concurrent: usize,
    min_gap: Duration,
}

impl DomainLimiter {
    pub fn new(max_concurrent: u32, min_gap: Duration) -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            max_concurrent: (max_concurrent as usize).max(1),
            min_gap,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_concurrent_per_domain,
            Duration::from_millis(config.minimum_time_between_requests),
        )
    }

    fn state(&self, domain: &str) -> Arc<DomainState> {
        let mut domains = match self.domains.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(domains.entry(domain.to_string()).or_insert_with(|| {
            Arc::new(DomainState {
                permits: Arc::new(Semaphore::new(self.max_concurrent)),
                next_slot: tokio::sync::Mutex::new(None),
                request_count: std::sync::atomic::AtomicU64::new(0),
            })
        }))
    }

    /// Waits until a request to `domain` may start
    pub async fn acquire(&self, domain: &str) -> Result<DomainPermit, FetchError> {
        let state = self.state(domain);

        let permit = Arc::clone(&state.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        {
            let mut next_slot = state.next_slot.lock().await;
            if let Some(slot) = *next_slot {
                if slot > Instant::now() {
                    tracing::trace!("Delaying next request to {}", domain);
                    tokio::time::sleep_until(slot).await;
                }
            }
            *next_slot = Some(Instant::now() + self.min_gap);
        }

        state
            .request_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        Ok(DomainPermit { _permit: permit })
    }

    /// Number of requests started against `domain` so far
    pub fn request_count(&self, domain: &str) -> u64 {
        let domains = match self.domains.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        domains
            .get(domain)
            .map(|s| s.request_count.load(std::sync::atomic::Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_concurrency_bounded_per_domain() {
        let limiter = Arc::new(DomainLimiter::new(2, Duration::ZERO));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let (limiter, active, peak) = (limiter.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire("agency.se").await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.request_count("agency.se"), 6);
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let limiter = DomainLimiter::new(1, Duration::ZERO);
        let _a = limiter.acquire("a.se").await.unwrap();
        let _b = limiter.acquire("b.se").await.unwrap();
        assert_eq!(limiter.request_count("a.se"), 1);
        assert_eq!(limiter.request_count("c.se"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_gap_between_requests() {
        let limiter = DomainLimiter::new(4, Duration::from_millis(500));
        let start = Instant::now();

        drop(limiter.acquire("agency.se").await.unwrap());
        drop(limiter.acquire("agency.se").await.unwrap());
        drop(limiter.acquire("agency.se").await.unwrap());

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
