//! Revalidation queue contract and the in-memory deduplicating queue.
//!
//! Deduplication is a property of the queue: a dedupe key seen within the
//! window is acknowledged without enqueueing a second job. Each shard is its
//! own FIFO channel, so jobs for the same path are consumed in order by one
//! worker while different shards run in parallel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::error::QueueDeliveryError;
use crate::revalidation::job::RevalidationJob;

/// Dedupe records kept before expired ones are swept.
const SWEEP_THRESHOLD: usize = 4096;

/// Broker acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAck {
    Enqueued,
    /// Same dedupe key already accepted within the window.
    Deduplicated,
}

/// Message broker for revalidation jobs.
#[async_trait]
pub trait RevalidationQueue: Send + Sync {
    async fn send(
        &self,
        job: &RevalidationJob,
        dedupe_key: &str,
        shard_id: u32,
    ) -> Result<SendAck, QueueDeliveryError>;
}

/// Receiving end of one shard.
pub type ShardReceiver = mpsc::UnboundedReceiver<RevalidationJob>;

/// In-process queue with one FIFO per shard.
pub struct MemoryQueue {
    shards: Vec<mpsc::UnboundedSender<RevalidationJob>>,
    seen: DashMap<String, u64>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("shards", &self.shards.len())
            .field("dedupe_records", &self.seen.len())
            .field("window", &self.window)
            .finish()
    }
}

impl MemoryQueue {
    /// Create the queue and the receivers, indexed by shard id.
    pub fn new(
        shard_count: u32,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> (Self, Vec<ShardReceiver>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..shard_count.max(1))
            .map(|_| mpsc::unbounded_channel())
            .unzip();
        (
            Self {
                shards: senders,
                seen: DashMap::new(),
                window,
                clock,
            },
            receivers,
        )
    }

    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    fn sweep(&self, now: u64) {
        let window = self.window.as_millis() as u64;
        self.seen.retain(|_, at| now.saturating_sub(*at) < window);
    }
}

#[async_trait]
impl RevalidationQueue for MemoryQueue {
    async fn send(
        &self,
        job: &RevalidationJob,
        dedupe_key: &str,
        shard_id: u32,
    ) -> Result<SendAck, QueueDeliveryError> {
        let shard = self
            .shards
            .get(shard_id as usize)
            .ok_or(QueueDeliveryError::UnknownShard(shard_id))?;

        let now = self.clock.now_millis();
        if self.seen.len() > SWEEP_THRESHOLD {
            self.sweep(now);
        }

        let window = self.window.as_millis() as u64;
        match self.seen.entry(dedupe_key.to_string()) {
            Entry::Occupied(mut record) => {
                if now.saturating_sub(*record.get()) < window {
                    return Ok(SendAck::Deduplicated);
                }
                record.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }

        if shard.send(job.clone()).is_err() {
            self.seen.remove(dedupe_key);
            return Err(QueueDeliveryError::Closed);
        }
        Ok(SendAck::Enqueued)
    }
}
