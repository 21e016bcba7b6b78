//! Shard workers consuming the in-memory revalidation queue.
//!
//! One task per shard processes jobs strictly in arrival order, so
//! regenerations of the same path never overlap. Workers exit on shutdown or
//! when their channel closes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lifecycle::Shutdown;
use crate::revalidation::job::RevalidationJob;
use crate::revalidation::queue::ShardReceiver;

/// Regenerates the entry a job points at.
#[async_trait]
pub trait Revalidator: Send + Sync {
    /// Status of the regeneration render.
    async fn revalidate(&self, job: &RevalidationJob) -> StatusCode;
}

/// Spawns and owns the per-shard consumer tasks.
pub struct RevalidationWorker {
    revalidator: Arc<dyn Revalidator>,
}

impl RevalidationWorker {
    pub fn new(revalidator: Arc<dyn Revalidator>) -> Self {
        Self { revalidator }
    }

    /// Start one consumer per receiver. Receivers are indexed by shard id.
    pub fn spawn(self, receivers: Vec<ShardReceiver>, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        receivers
            .into_iter()
            .enumerate()
            .map(|(shard, rx)| {
                let revalidator = self.revalidator.clone();
                let stop = shutdown.subscribe();
                tokio::spawn(run_shard(shard as u32, rx, revalidator, stop))
            })
            .collect()
    }
}

async fn run_shard(
    shard: u32,
    mut rx: ShardReceiver,
    revalidator: Arc<dyn Revalidator>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                let status = revalidator.revalidate(&job).await;
                if status.is_success() || status.is_redirection() {
                    info!(shard, path = %job.path, status = status.as_u16(), "Revalidated");
                } else {
                    warn!(shard, path = %job.path, status = status.as_u16(), "Revalidation render failed");
                }
            }
        }
    }
    info!(shard, "Revalidation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::revalidation::queue::{MemoryQueue, RevalidationQueue};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Revalidator for Recorder {
        async fn revalidate(&self, job: &RevalidationJob) -> StatusCode {
            self.seen.lock().await.push(job.path.clone());
            StatusCode::OK
        }
    }

    #[tokio::test]
    async fn test_worker_processes_then_stops() {
        let (queue, receivers) =
            MemoryQueue::new(2, Duration::from_secs(300), Arc::new(ManualClock::new(0)));
        let recorder = Arc::new(Recorder::default());
        let shutdown = Shutdown::new();
        let handles = RevalidationWorker::new(recorder.clone()).spawn(receivers, &shutdown);

        for last_modified in [1, 2] {
            let job = RevalidationJob::new("/admin", "pos.example", "\"e\"", last_modified, 2);
            queue.send(&job, &job.dedupe_key, job.shard_id).await.unwrap();
        }

        for _ in 0..100 {
            if recorder.seen.lock().await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*recorder.seen.lock().await, vec!["/admin", "/admin"]);

        shutdown.trigger();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
