//! Bounded worker pool for guarded plugin calls

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Default number of concurrent guarded calls
pub const DEFAULT_WORKERS: usize = 4;

/// Runs guarded calls on background tasks, at most `size` at a time
///
/// A call only starts once it holds a worker slot. A started call abandoned
/// by its caller (timeout) keeps running and keeps its slot until it
/// finishes. Every started call is tracked so shutdown can wait for
/// stragglers.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    size: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl WorkerPool {
    /// Create a pool; a size of zero is treated as one
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Calls running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for a worker slot, then run `fut` on it
    ///
    /// Nothing is spawned while waiting: dropping this future before it
    /// resolves leaves no call behind.
    pub async fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        // The semaphore is never closed, so acquisition only waits
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok();
        self.tracker.spawn(
            async move {
                let _permit = permit;
                fut.await
            }
            .in_current_span(),
        )
    }

    /// Stop accepting work and wait up to `grace` for outstanding calls
    ///
    /// Returns `true` when everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let outstanding = self.tracker.len();
        if outstanding > 0 {
            tracing::info!("Waiting up to {:?} for {} plugin call(s)", grace, outstanding);
        }
        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(
                "{} plugin call(s) still running after {:?}",
                self.tracker.len(),
                grace
            );
        }
        drained
    }
}
