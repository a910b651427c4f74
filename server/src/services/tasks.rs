//! Detached background tasks
//!
//! Payment waiters outlive the HTTP request that started them. They are
//! spawned through a `TaskSupervisor`, which owns the shared cancellation
//! token and logs every failure or panic.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Clone, Default)]
pub struct TaskSupervisor {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled on shutdown; long-running tasks select on it
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of tasks still running
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn a task that is not tied to any request.
    ///
    /// The future runs in its own tokio task so a panic is contained and
    /// reported here; its error, if any, is logged with `name`.
    pub fn spawn_detached<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let inner = tokio::spawn(fut);
        self.tracker.spawn(async move {
            match inner.await {
                Ok(Ok(())) => debug!(task = name, "Background task finished"),
                Ok(Err(e)) => error!(task = name, error = %format!("{:#}", e), "Background task failed"),
                Err(e) if e.is_panic() => error!(task = name, "Background task panicked"),
                Err(e) => warn!(task = name, error = %e, "Background task aborted"),
            }
        });
    }

    /// Wait for every task spawned so far, then accept new ones again.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel all tasks and wait up to `grace` for them to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        self.tracker.close();

        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for background tasks to stop");
        }
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "Background tasks still running at shutdown"
            );
        }
    }
}
