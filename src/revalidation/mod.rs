//! Background revalidation subsystem.
//!
//! # Data Flow
//! ```text
//! Cache interceptor finds a STALE entry
//!     → producer.rs (build job, dedupe key, shard id)
//!     → queue.rs (broker: dedupe window, FIFO per shard)
//!     → worker.rs (one consumer per shard)
//!     → Revalidator (re-renders through the pipeline, writing a new entry)
//! ```

pub mod job;
pub mod producer;
pub mod queue;
pub mod worker;

pub use job::{dedupe_key, shard_id, RevalidationJob};
pub use producer::RevalidationProducer;
pub use queue::{MemoryQueue, RevalidationQueue, SendAck, ShardReceiver};
pub use worker::{RevalidationWorker, Revalidator};
