//! Page renderer contract and the origin-backed implementation.
//!
//! # Responsibilities
//! - Hand the finalized request and resolved route to the rendering server
//! - Write the rendered artifact to the cache store for cacheable routes
//!
//! # Design Decisions
//! - The renderer owns cache writes; the interceptor only reads
//! - The origin's own `cache-control` can veto storage (`no-store`, `private`)
//! - Cache fills are requested unencoded; entries are keyed by path and locale only,
//!   so a `vary` on anything else, or an encoded body, is never stored
//! - A failed cache write never fails the render

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::cache::control::CacheControl;
use crate::cache::entry::{CacheEntry, CacheKind, CacheMeta, CacheValue};
use crate::cache::store::CacheStore;
use crate::clock::Clock;
use crate::error::RenderError;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;
use crate::routing::matcher::Params;
use crate::routing::router::Revalidate;
use crate::upstream::client::{self, HttpClient, UpstreamFailure};

/// Response header listing the cache tags of a rendered page, comma separated.
pub const CACHE_TAGS_HEADER: &str = "x-cache-tags";
/// Page identifier handed to the origin.
pub const PAGE_HEADER: &str = "x-edge-page";
/// Route params handed to the origin, as a JSON object.
pub const PARAMS_HEADER: &str = "x-edge-params";
/// Resolved locale handed to the origin.
pub const LOCALE_HEADER: &str = "x-edge-locale";

/// Headers that describe one delivery, not the artifact.
const UNCACHED_HEADERS: &[&str] = &[
    "set-cookie",
    "cache-control",
    "date",
    "age",
    "content-length",
    "etag",
    CACHE_TAGS_HEADER,
];

/// Request headers a cache key already accounts for. `accept-encoding` is
/// stripped from cache fills, so varying on it is harmless.
const KEYED_VARY: &[&str] = &["accept-language", "cookie", "accept-encoding"];

/// What the orchestrator asks the renderer to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Page,
    Api,
    /// Build asset or public file.
    Asset,
    /// The `/404` page.
    NotFound,
    /// The `/500` page.
    Error,
}

impl DispatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchKind::Page => "page",
            DispatchKind::Api => "api",
            DispatchKind::Asset => "asset",
            DispatchKind::NotFound => "not_found",
            DispatchKind::Error => "error",
        }
    }
}

/// Route resolution handed to the renderer.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub kind: DispatchKind,
    pub page_id: Option<String>,
    pub params: Params,
    /// Present when the render result should be written to the cache.
    pub cache_key: Option<String>,
    pub revalidate: Revalidate,
}

impl ResolvedRoute {
    pub fn new(kind: DispatchKind) -> Self {
        Self {
            kind,
            page_id: None,
            params: Params::new(),
            cache_key: None,
            revalidate: Revalidate::Never,
        }
    }
}

/// Produces responses for resolved routes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        req: &InternalRequest,
        route: &ResolvedRoute,
    ) -> Result<EdgeResponse, RenderError>;
}

/// Renders by forwarding to the configured origin server.
pub struct OriginRenderer {
    client: HttpClient,
    origin: String,
    timeout: Duration,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OriginRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginRenderer")
            .field("origin", &self.origin)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OriginRenderer {
    pub fn new(
        origin: impl Into<String>,
        timeout: Duration,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client: client::build_client(),
            origin: origin.into(),
            timeout,
            store,
            clock,
        }
    }

    fn route_headers(route: &ResolvedRoute, req: &InternalRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(page) = &route.page_id {
            headers.set_str(PAGE_HEADER, page);
        }
        if !route.params.is_empty() {
            if let Ok(json) = serde_json::to_string(&route.params) {
                headers.set_str(PARAMS_HEADER, &json);
            }
        }
        if let Some(locale) = &req.locale {
            headers.set_str(LOCALE_HEADER, locale);
        }
        headers
    }
}

#[async_trait]
impl Renderer for OriginRenderer {
    async fn render(
        &self,
        req: &InternalRequest,
        route: &ResolvedRoute,
    ) -> Result<EdgeResponse, RenderError> {
        let extra = Self::route_headers(route, req);
        let mut request = client::forward_request(&self.origin, req, &extra).map_err(render_error)?;
        if route.cache_key.is_some() {
            request.headers_mut().remove(header::ACCEPT_ENCODING);
        }
        let response = client::send(&self.client, request, self.timeout)
            .await
            .map_err(render_error)?;

        if let Some(key) = &route.cache_key {
            if let Some(entry) = cache_entry_for(key, &response, self.clock.now_millis()) {
                match self.store.put(entry).await {
                    Ok(()) => debug!(key = %key, "Cache entry written"),
                    Err(e) => warn!(key = %key, error = %e, "Cache write failed"),
                }
            }
        }

        let mut response = response;
        response.headers.remove(CACHE_TAGS_HEADER);
        Ok(response)
    }
}

fn render_error(failure: UpstreamFailure) -> RenderError {
    match failure {
        UpstreamFailure::Timeout => RenderError::Timeout,
        UpstreamFailure::Transport(e) => RenderError::Upstream(e),
        UpstreamFailure::InvalidRequest(e) => RenderError::InvalidRequest(e),
    }
}

/// Build the cache entry for a rendered response, or `None` if it must not be stored.
pub fn cache_entry_for(key: &str, response: &EdgeResponse, now_ms: u64) -> Option<CacheEntry> {
    let status = response.status;
    if status != StatusCode::OK && !is_cacheable_redirect(status) {
        return None;
    }
    if let Some(cc) = response.headers.get_str(header::CACHE_CONTROL.as_str()) {
        if !CacheControl::parse(cc).is_cacheable_by_shared_cache() {
            return None;
        }
    }
    if !varies_only_on_key(&response.headers) || is_encoded(&response.headers) {
        return None;
    }

    let tags: Vec<&str> = response
        .headers
        .get_all_str(CACHE_TAGS_HEADER)
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let kind = if status.is_redirection() {
        CacheKind::Redirect
    } else if tags.is_empty() {
        CacheKind::Page
    } else {
        CacheKind::App
    };

    let mut headers = response.headers.clone();
    for name in UNCACHED_HEADERS {
        headers.remove(*name);
    }

    let value = CacheValue {
        kind,
        body: response.body.clone(),
        meta: CacheMeta { status, headers },
    };
    Some(CacheEntry::new(key, value, now_ms).with_tags(tags))
}

fn varies_only_on_key(headers: &HeaderMap) -> bool {
    headers
        .get_all_str(header::VARY.as_str())
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .all(|name| KEYED_VARY.iter().any(|k| k.eq_ignore_ascii_case(name)))
}

fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_str(header::CONTENT_ENCODING.as_str())
        .is_some_and(|enc| !enc.trim().eq_ignore_ascii_case("identity"))
}

fn is_cacheable_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}
