//! Cache entry structures.
//!
//! Entries are written whole by the renderer and never mutated: regeneration
//! writes a new entry with a new `last_modified`.

use std::collections::BTreeSet;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::Serialize;

use crate::cache::control::etag_for;

/// What kind of artifact an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Page with data dependencies (tagged fetches).
    App,
    /// Plain pre-rendered page. Tag checks are skipped.
    Page,
    /// Route handler output.
    Route,
    /// Cached redirect.
    Redirect,
}

impl CacheKind {
    /// Whether tag revalidation records apply to this kind.
    pub fn checks_tags(&self) -> bool {
        matches!(self, CacheKind::App | CacheKind::Route)
    }
}

/// Status and headers replayed with the body.
#[derive(Debug, Clone)]
pub struct CacheMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// The cached artifact.
#[derive(Debug, Clone)]
pub struct CacheValue {
    pub kind: CacheKind,
    pub body: Bytes,
    pub meta: CacheMeta,
}

/// One cache entry, keyed by route path.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: CacheValue,
    /// Milliseconds since the Unix epoch.
    pub last_modified: u64,
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: CacheValue, last_modified: u64) -> Self {
        Self {
            key: key.into(),
            value,
            last_modified,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Strong validator derived from the body.
    pub fn etag(&self) -> String {
        etag_for(&self.value.body)
    }

    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.body.len()
    }
}

/// Entry summary exposed by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub kind: CacheKind,
    pub status: u16,
    pub last_modified: u64,
    pub tags: Vec<String>,
    pub size_bytes: usize,
}

impl From<&CacheEntry> for EntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            kind: entry.value.kind,
            status: entry.value.meta.status.as_u16(),
            last_modified: entry.last_modified,
            tags: entry.tags.iter().cloned().collect(),
            size_bytes: entry.size_bytes(),
        }
    }
}
