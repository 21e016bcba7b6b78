//! Cache interception: PASSTHROUGH, LOOKUP, then HIT, STALE or MISS.
//!
//! # Responsibilities
//! - Skip caching for server actions, on-demand revalidation and preview mode
//! - Look up the entry for the route's cache key
//! - Apply tag invalidation before time-based freshness
//! - Serve HIT/STALE with `cache-control`, `etag` and the status header
//! - Schedule background revalidation for STALE without delaying the response
//!
//! # Design Decisions
//! - Fail open: any store error is a MISS marked `ERROR`
//! - Tag invalidation always beats time-based freshness
//! - Plain pages and redirects skip tag checks

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::control::{freshness, if_none_match, Freshness};
use crate::cache::entry::CacheEntry;
use crate::cache::store::CacheStore;
use crate::clock::Clock;
use crate::error::CacheError;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;
use crate::middleware::tasks::RequestScope;
use crate::observability::metrics;
use crate::revalidation::producer::RevalidationProducer;
use crate::routing::router::Revalidate;

/// Header carrying a server action id.
pub const SERVER_ACTION_HEADER: &str = "x-server-action";
/// Header marking an on-demand revalidation render.
pub const REVALIDATE_HEADER: &str = "x-prerender-revalidate";
/// Cookie set while preview mode is on.
pub const PREVIEW_COOKIE: &str = "__prerender_bypass";

/// Why a request skipped the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// Only GET and HEAD are cacheable.
    Method,
    ServerAction,
    /// Regeneration render; the result is written back to the cache.
    Revalidate,
    Preview,
}

/// Diagnostic cache status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Miss => "MISS",
            CacheStatus::Error => "ERROR",
        }
    }
}

/// What the orchestrator should do next.
#[derive(Debug)]
pub enum CacheDecision {
    /// Render without consulting the cache.
    Passthrough(Passthrough),
    /// Answer from cache.
    Serve {
        response: EdgeResponse,
        status: CacheStatus,
    },
    /// Render; `status` is MISS or ERROR.
    Render { status: CacheStatus },
}

/// Per-process cache interceptor.
#[derive(Clone)]
pub struct CacheInterceptor {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    producer: RevalidationProducer,
    status_header: HeaderName,
    revalidate_token: String,
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("status_header", &self.status_header)
            .field("producer", &self.producer)
            .finish()
    }
}

impl CacheInterceptor {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        producer: RevalidationProducer,
        status_header: HeaderName,
        revalidate_token: String,
    ) -> Self {
        Self {
            store,
            clock,
            producer,
            status_header,
            revalidate_token,
        }
    }

    pub fn status_header(&self) -> &HeaderName {
        &self.status_header
    }

    /// Token a revalidation request must present in `x-prerender-revalidate`.
    pub fn revalidate_token(&self) -> &str {
        &self.revalidate_token
    }

    /// Set the diagnostic status header on `response`.
    pub fn mark(&self, response: &mut EdgeResponse, status: CacheStatus) {
        response
            .headers
            .insert(self.status_header.clone(), HeaderValue::from_static(status.as_str()));
    }

    /// First no-cache condition that holds for `req`.
    pub fn passthrough(&self, req: &InternalRequest) -> Option<Passthrough> {
        if req.method != Method::GET && req.method != Method::HEAD {
            return Some(Passthrough::Method);
        }
        if req.headers.contains_key(SERVER_ACTION_HEADER) {
            return Some(Passthrough::ServerAction);
        }
        if req
            .headers
            .get_str(REVALIDATE_HEADER)
            .is_some_and(|token| token == self.revalidate_token)
        {
            return Some(Passthrough::Revalidate);
        }
        if req.cookies.contains_key(PREVIEW_COOKIE) {
            return Some(Passthrough::Preview);
        }
        None
    }

    /// Decide HIT/STALE/MISS for a cacheable route.
    pub async fn intercept(
        &self,
        req: &InternalRequest,
        cache_key: &str,
        revalidate: Revalidate,
        scope: &RequestScope,
    ) -> CacheDecision {
        if let Some(reason) = self.passthrough(req) {
            debug!(key = cache_key, reason = ?reason, "Cache passthrough");
            metrics::record_cache_lookup("BYPASS");
            return CacheDecision::Passthrough(reason);
        }

        let decision = match self.lookup(cache_key).await {
            Ok(Some(entry)) => self.classify(req, entry, revalidate, scope).await,
            Ok(None) => CacheDecision::Render {
                status: CacheStatus::Miss,
            },
            Err(e) => {
                warn!(key = cache_key, error = %e, "Cache lookup failed, rendering");
                CacheDecision::Render {
                    status: CacheStatus::Error,
                }
            }
        };

        let status = match &decision {
            CacheDecision::Serve { status, .. } | CacheDecision::Render { status } => *status,
            CacheDecision::Passthrough(_) => CacheStatus::Miss,
        };
        metrics::record_cache_lookup(status.as_str());
        debug!(key = cache_key, status = status.as_str(), "Cache decision");
        decision
    }

    /// Entry for `key`, or `None` when a tag revalidation invalidated it.
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(entry) = self.store.get(key).await? else {
            return Ok(None);
        };
        if !entry.value.kind.checks_tags() {
            return Ok(Some(entry));
        }
        for tag in &entry.tags {
            if let Some(at) = self.store.tag_revalidated_at(tag).await? {
                if at > entry.last_modified {
                    debug!(key, tag = %tag, "Entry invalidated by tag");
                    return Ok(None);
                }
            }
        }
        Ok(Some(entry))
    }

    async fn classify(
        &self,
        req: &InternalRequest,
        entry: CacheEntry,
        revalidate: Revalidate,
        scope: &RequestScope,
    ) -> CacheDecision {
        let fresh = freshness(revalidate, entry.last_modified, self.clock.now_millis());
        let etag = entry.etag();

        let status = if fresh == Freshness::Stale {
            let producer = self.producer.clone();
            let (path, host, tag, last_modified) = (
                entry.key.clone(),
                req.host.clone(),
                etag.clone(),
                entry.last_modified,
            );
            scope.wait_until(async move {
                producer.enqueue(&path, &host, &tag, last_modified).await;
            });
            CacheStatus::Stale
        } else {
            CacheStatus::Hit
        };

        let not_modified = req
            .headers
            .get_str(header::IF_NONE_MATCH.as_str())
            .is_some_and(|h| if_none_match(h, &etag));

        let mut response = if not_modified {
            EdgeResponse::new(StatusCode::NOT_MODIFIED, Default::default(), Bytes::new())
        } else {
            EdgeResponse::new(
                entry.value.meta.status,
                entry.value.meta.headers.clone(),
                entry.value.body.clone(),
            )
        };
        response
            .headers
            .set_str(header::CACHE_CONTROL.as_str(), &fresh.cache_control());
        response.headers.set_str(header::ETAG.as_str(), &etag);
        self.mark(&mut response, status);

        CacheDecision::Serve { response, status }
    }
}
