//! Bounded pool for fire-and-forget background work

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Semaphore-limited tasks tracked for shutdown
///
/// The pool owns its own cancellation token so stopping the capture loop
/// does not abort enrichment that is already queued.
#[derive(Clone)]
pub struct WorkerPool {
    tracker: TaskTracker,
    token: CancellationToken,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run `task` once a worker slot frees up, unless the pool is cancelled first
    pub fn spawn<F>(&self, label: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let token = self.token.clone();

        self.tracker.spawn(async move {
            let _permit = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Dropped queued {} task on shutdown", label);
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            tokio::select! {
                _ = token.cancelled() => debug!("Cancelled running {} task", label),
                _ = task => {}
            }
        })
    }

    /// Number of tasks spawned and not yet finished
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work, wait up to `grace`, then cancel what is left
    ///
    /// Returns `true` when every task finished inside the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            info!("Background tasks drained");
            return true;
        }

        warn!(
            "{} background tasks still running after {:?}, cancelling",
            self.tracker.len(),
            grace
        );
        self.token.cancel();
        self.tracker.wait().await;
        false
    }
}
