//! Revalidation jobs: dedupe keys and shard assignment.
//!
//! Both derivations are pure SHA-256 functions of their inputs, so they are
//! stable across calls, processes and restarts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Request to regenerate one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidationJob {
    /// Cache key of the stale entry.
    pub path: String,
    pub host: String,
    pub etag: String,
    /// `last_modified` of the generation that was found stale.
    pub last_modified: u64,
    pub dedupe_key: String,
    pub shard_id: u32,
}

impl RevalidationJob {
    pub fn new(
        path: impl Into<String>,
        host: impl Into<String>,
        etag: impl Into<String>,
        last_modified: u64,
        shard_count: u32,
    ) -> Self {
        let path = path.into();
        let etag = etag.into();
        Self {
            dedupe_key: dedupe_key(&path, last_modified, &etag),
            shard_id: shard_id(&path, shard_count),
            host: host.into(),
            path,
            etag,
            last_modified,
        }
    }

    /// Queue partition this job belongs to.
    pub fn partition(&self) -> String {
        partition_name(self.shard_id)
    }
}

/// Hash of `(path, last_modified, etag)`: one key per generation per path.
pub fn dedupe_key(path: &str, last_modified: u64, etag: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0]);
    hasher.update(last_modified.to_be_bytes());
    hasher.update([0]);
    hasher.update(etag.as_bytes());
    hex::encode(hasher.finalize())
}

/// `hash(path) mod shard_count`. A zero shard count is treated as one shard.
pub fn shard_id(path: &str, shard_count: u32) -> u32 {
    let digest = Sha256::digest(path.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(shard_count.max(1))) as u32
}

pub fn partition_name(shard_id: u32) -> String {
    format!("revalidate-{shard_id}")
}
