//! Pool of render sessions
//!
//! Rendering is the expensive, limited resource. The pool hands out at most `size`
//! leases at once, each bound to one session, and a lease is kept across all the
//! pagination steps of a listing instead of being re-acquired per page.

use crate::fetch::{FetchAdapter, FetchError, RenderedPage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

struct Session {
    id: usize,
    adapter: Arc<dyn FetchAdapter>,
    pages_rendered: AtomicU64,
}

pub struct SessionPool {
    idle: Mutex<Vec<Session>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl SessionPool {
    /// Creates a pool of `size` sessions, each produced by `factory`
    pub fn new<F>(size: usize, mut factory: F) -> Arc<Self>
    where
        F: FnMut(usize) -> Arc<dyn FetchAdapter>,
    {
        let size = size.max(1);
        let idle = (0..size)
            .map(|id| Session {
                id,
                adapter: factory(id),
                pages_rendered: AtomicU64::new(0),
            })
            .collect();

        Arc::new(Self {
            idle: Mutex::new(idle),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Creates a pool whose sessions all share one adapter
    pub fn shared(size: usize, adapter: Arc<dyn FetchAdapter>) -> Arc<Self> {
        Self::new(size, |_| Arc::clone(&adapter))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of sessions not currently leased
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free session
    pub async fn acquire(self: &Arc<Self>) -> Result<SessionLease, FetchError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let session = self
            .idle
            .lock()
            .map_err(|_| FetchError::Cancelled)?
            .pop()
            .ok_or(FetchError::Cancelled)?;

        tracing::trace!("Leased render session {}", session.id);

        Ok(SessionLease {
            pool: Arc::clone(self),
            session: Some(session),
            busy: tokio::sync::Mutex::new(()),
            _permit: permit,
        })
    }

    fn give_back(&self, session: Session) {
        tracing::trace!(
            "Returned render session {} ({} pages rendered)",
            session.id,
            session.pages_rendered.load(Ordering::Relaxed)
        );
        match self.idle.lock() {
            Ok(mut idle) => idle.push(session),
            Err(poisoned) => poisoned.into_inner().push(session),
        }
    }
}

/// Exclusive use of one render session
///
/// Dropping the lease returns the session to the pool before its permit is released,
/// so the next waiter always finds an idle session.
pub struct SessionLease {
    pool: Arc<SessionPool>,
    session: Option<Session>,
    busy: tokio::sync::Mutex<()>,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    pub fn session_id(&self) -> usize {
        self.session.as_ref().map(|s| s.id).unwrap_or_default()
    }

    /// Renders one page; concurrent calls on the same lease are serialized
    pub async fn render(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let session = self.session.as_ref().ok_or(FetchError::Cancelled)?;
        let _busy = self.busy.lock().await;
        let page = session.adapter.render(url).await?;
        session.pages_rendered.fetch_add(1, Ordering::Relaxed);
        Ok(page)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(session);
        }
    }
}
