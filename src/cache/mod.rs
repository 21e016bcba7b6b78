//! Incremental cache.
//!
//! # Data Flow
//! ```text
//! Orchestrator (cacheable route, cache key)
//!     → interceptor.rs (passthrough checks, lookup, tag check, freshness)
//!     → store.rs (entries and tag revalidation records)
//!     → control.rs (s-maxage arithmetic, ETag)
//! STALE → revalidation producer, scheduled on the request scope
//! ```

pub mod control;
pub mod entry;
pub mod interceptor;
pub mod store;

pub use control::{CacheControl, Freshness};
pub use entry::{CacheEntry, CacheKind, CacheMeta, CacheValue, EntrySummary};
pub use interceptor::{CacheDecision, CacheInterceptor, CacheStatus, Passthrough};
pub use store::{CacheStore, MemoryCacheStore, StoreStats};
