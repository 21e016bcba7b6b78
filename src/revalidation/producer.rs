//! Builds revalidation jobs for stale entries and hands them to the queue.

use std::sync::Arc;

use tracing::{debug, error};

use crate::observability::metrics;
use crate::revalidation::job::RevalidationJob;
use crate::revalidation::queue::{RevalidationQueue, SendAck};

/// Enqueues one job per stale generation. Failures are logged, never raised.
#[derive(Clone)]
pub struct RevalidationProducer {
    queue: Arc<dyn RevalidationQueue>,
    shard_count: u32,
}

impl std::fmt::Debug for RevalidationProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevalidationProducer")
            .field("shard_count", &self.shard_count)
            .finish()
    }
}

impl RevalidationProducer {
    pub fn new(queue: Arc<dyn RevalidationQueue>, shard_count: u32) -> Self {
        Self {
            queue,
            shard_count: shard_count.max(1),
        }
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Enqueue regeneration of `path` for the generation `(last_modified, etag)`.
    pub async fn enqueue(
        &self,
        path: &str,
        host: &str,
        etag: &str,
        last_modified: u64,
    ) -> Option<SendAck> {
        let job = RevalidationJob::new(path, host, etag, last_modified, self.shard_count);
        match self.queue.send(&job, &job.dedupe_key, job.shard_id).await {
            Ok(ack) => {
                if ack == SendAck::Enqueued {
                    metrics::record_revalidation_enqueued();
                }
                debug!(
                    path = %job.path,
                    shard = job.shard_id,
                    dedupe_key = %job.dedupe_key,
                    ack = ?ack,
                    "Revalidation job sent"
                );
                Some(ack)
            }
            Err(e) => {
                metrics::record_queue_failure();
                error!(
                    path = %job.path,
                    shard = job.shard_id,
                    error = %e,
                    "Failed to enqueue revalidation job"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::revalidation::queue::MemoryQueue;
    use std::time::Duration;

    #[tokio::test]
    async fn test_enqueue_dedupes_and_survives_failure() {
        let (queue, receivers) =
            MemoryQueue::new(3, Duration::from_secs(300), Arc::new(ManualClock::new(0)));
        let producer = RevalidationProducer::new(Arc::new(queue), 3);

        assert_eq!(
            producer.enqueue("/admin", "pos.example", "\"e\"", 1).await,
            Some(SendAck::Enqueued)
        );
        assert_eq!(
            producer.enqueue("/admin", "pos.example", "\"e\"", 1).await,
            Some(SendAck::Deduplicated)
        );

        drop(receivers);
        assert_eq!(producer.enqueue("/orders", "pos.example", "\"e\"", 1).await, None);
    }
}
