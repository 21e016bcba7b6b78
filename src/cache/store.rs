//! Cache store contract and the in-memory implementation.
//!
//! The store is the only shared mutable state in the request path. Operations
//! are single-key get/put; there is no multi-key transaction. Staleness is
//! decided by comparing timestamps, never by locking.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::cache::entry::{CacheEntry, EntrySummary};
use crate::error::CacheError;

/// Store statistics.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: u64,
    pub tags: u64,
    pub reads: u64,
    pub writes: u64,
    pub evictions: u64,
    pub size_bytes: u64,
}

/// Cache entries plus tag revalidation records.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry under its key, replacing any previous generation.
    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// When `tag` was last revalidated, in epoch milliseconds.
    async fn tag_revalidated_at(&self, tag: &str) -> Result<Option<u64>, CacheError>;

    /// Record that `tag` was revalidated at `at`. Never moves a record backwards.
    async fn revalidate_tag(&self, tag: &str, at: u64) -> Result<(), CacheError>;

    /// Remove the entry under `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn stats(&self) -> Result<StoreStats, CacheError>;

    /// Summaries of stored entries. Stores that cannot enumerate return nothing.
    async fn list(&self) -> Result<Vec<EntrySummary>, CacheError> {
        Ok(Vec::new())
    }
}

/// Entry cap used when none is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Process-local store for single-node deployments and tests.
///
/// Holds at most `max_entries` entries. Inserting a new key into a full store
/// evicts the least recently written entry. The cap is approximate under
/// concurrent inserts and is not shared between nodes.
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    tags: DashMap<String, u64>,
    max_entries: usize,
    reads: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            tags: DashMap::new(),
            max_entries: max_entries.max(1),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_modified)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache entry evicted");
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn tag_revalidated_at(&self, tag: &str) -> Result<Option<u64>, CacheError> {
        Ok(self.tags.get(tag).map(|at| *at))
    }

    async fn revalidate_tag(&self, tag: &str, at: u64) -> Result<(), CacheError> {
        self.tags
            .entry(tag.to_string())
            .and_modify(|current| *current = (*current).max(at))
            .or_insert(at);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn stats(&self) -> Result<StoreStats, CacheError> {
        let size_bytes = self
            .entries
            .iter()
            .map(|e| e.value().size_bytes() as u64)
            .sum();
        Ok(StoreStats {
            entries: self.entries.len() as u64,
            tags: self.tags.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size_bytes,
        })
    }

    async fn list(&self) -> Result<Vec<EntrySummary>, CacheError> {
        let mut summaries: Vec<EntrySummary> = self
            .entries
            .iter()
            .map(|e| EntrySummary::from(e.value()))
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }
}
