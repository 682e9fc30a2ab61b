//! Process-wide admission gate for outbound byte downloads.
//!
//! One [`DownloadThrottle`] is built at startup and cloned into every
//! adapter. Permits are RAII guards: dropping a [`DownloadPermit`] releases
//! its slot exactly once, whether the download succeeded, failed, or its
//! future was cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default capacity shared by all users and providers.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

#[derive(Clone, Debug)]
pub struct DownloadThrottle {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl DownloadThrottle {
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Downloads currently holding a permit.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously held permits since construction.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> DownloadPermit {
        // The semaphore is owned here and never closed.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("download semaphore is never closed");
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        DownloadPermit {
            _permit: permit,
            active: self.active.clone(),
        }
    }

    /// Run `fut` while holding a permit.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let _permit = self.acquire().await;
        fut.await
    }
}

impl Default for DownloadThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_CONCURRENCY)
    }
}

/// Held for the duration of one download.
pub struct DownloadPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for DownloadPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
