//! Request-scoped background work.
//!
//! Middleware and the cache interceptor may schedule work that outlives the
//! response (`waitUntil`). Each request owns one `RequestScope`; the server
//! answers the client first, then awaits `finish()` before dropping the
//! request's resources, so no task is leaked.

use std::future::Future;

use tokio_util::task::TaskTracker;

/// Collection of detached tasks belonging to one request.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    tracker: TaskTracker,
}

impl RequestScope {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Run `task` in the background, tracked by this scope.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait for every tracked task.
    pub async fn finish(self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
