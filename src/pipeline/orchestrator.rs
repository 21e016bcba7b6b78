//! Routing orchestrator.
//!
//! # Stages
//! ```text
//! Normalize → RedirectCheck → Middleware → BeforeFiles → AssetShortCircuit
//!     → StaticMatch | AfterFiles → FallbackResolve → DynamicMatch | FallbackRewrites
//!     → CacheIntercept → Dispatch
//! ```
//!
//! Stages only move forward. A stage either hands the request to the next one
//! or produces the response. Any stage error replays the request as a synthetic
//! `/500` from Dispatch; the error response still gets header merging.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method, StatusCode};
use tracing::{debug, error, warn};
use url::Url;

use crate::cache::interceptor::{
    CacheDecision, CacheInterceptor, CacheStatus, Passthrough, REVALIDATE_HEADER,
};
use crate::cache::store::CacheStore;
use crate::clock::Clock;
use crate::config::ConfigError;
use crate::error::PipelineError;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;
use crate::middleware::executor::{Middleware, MiddlewareExecutor, MiddlewareOutcome};
use crate::middleware::merge::merge_response_headers;
use crate::middleware::tasks::RequestScope;
use crate::pipeline::manifest::Manifest;
use crate::revalidation::job::RevalidationJob;
use crate::revalidation::producer::RevalidationProducer;
use crate::revalidation::queue::RevalidationQueue;
use crate::revalidation::worker::Revalidator;
use crate::rewrite::destination::Destination;
use crate::rewrite::engine::{Phase, RewriteOutcome};
use crate::routing::fallback::{resolve_fallback, FallbackDecision};
use crate::routing::locale::LocaleSource;
use crate::routing::router::{RouteKind, RouteMatch};
use crate::upstream::proxy::ExternalProxy;
use crate::upstream::renderer::{DispatchKind, Renderer, ResolvedRoute};

/// Pipeline stage, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Normalize,
    RedirectCheck,
    Middleware,
    BeforeFiles,
    AssetShortCircuit,
    StaticMatch,
    AfterFiles,
    FallbackResolve,
    DynamicMatch,
    FallbackRewrites,
    CacheIntercept,
    Dispatch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::RedirectCheck => "redirect_check",
            Stage::Middleware => "middleware",
            Stage::BeforeFiles => "before_files",
            Stage::AssetShortCircuit => "asset",
            Stage::StaticMatch => "static_match",
            Stage::AfterFiles => "after_files",
            Stage::FallbackResolve => "fallback_resolve",
            Stage::DynamicMatch => "dynamic_match",
            Stage::FallbackRewrites => "fallback_rewrites",
            Stage::CacheIntercept => "cache_intercept",
            Stage::Dispatch => "dispatch",
        }
    }
}

/// External collaborators injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn Renderer>,
    pub store: Arc<dyn CacheStore>,
    pub queue: Arc<dyn RevalidationQueue>,
    pub shard_count: u32,
    pub proxy: Arc<dyn ExternalProxy>,
    pub middleware: Option<Arc<dyn Middleware>>,
    pub clock: Arc<dyn Clock>,
}

/// Per-request state that outlives individual stages.
#[derive(Debug, Default)]
struct RequestContext {
    stage: Option<Stage>,
    config_headers: HeaderMap,
    middleware_headers: HeaderMap,
    cache_status: Option<CacheStatus>,
    vary_on_locale: bool,
}

impl RequestContext {
    fn enter(&mut self, stage: Stage) {
        debug_assert!(self.stage.map_or(true, |current| current <= stage));
        self.stage = Some(stage);
    }

    fn stage(&self) -> &'static str {
        self.stage.map(|s| s.as_str()).unwrap_or("start")
    }
}

/// The request routing pipeline.
pub struct Pipeline {
    manifest: Arc<Manifest>,
    middleware: MiddlewareExecutor,
    cache: CacheInterceptor,
    renderer: Arc<dyn Renderer>,
    proxy: Arc<dyn ExternalProxy>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Pipeline {
    pub fn new(manifest: Manifest, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let middleware = MiddlewareExecutor::new(
            collaborators.middleware,
            &manifest.middleware_matchers,
            manifest.upstream_timeout,
        )?;
        let producer = RevalidationProducer::new(collaborators.queue, collaborators.shard_count);
        let cache = CacheInterceptor::new(
            collaborators.store,
            collaborators.clock,
            producer,
            manifest.status_header.clone(),
            uuid::Uuid::new_v4().simple().to_string(),
        );
        Ok(Self {
            manifest: Arc::new(manifest),
            middleware,
            cache,
            renderer: collaborators.renderer,
            proxy: collaborators.proxy,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Token that lets a request bypass the cache and regenerate its entry.
    pub fn revalidate_token(&self) -> &str {
        self.cache.revalidate_token()
    }

    /// Route one request. The caller answers the client, then awaits the scope.
    pub async fn handle(&self, mut req: InternalRequest) -> (EdgeResponse, RequestScope) {
        let scope = RequestScope::new();
        let mut ctx = RequestContext::default();

        let response = match self.route(&mut req, &scope, &mut ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    request_id = %req.request_id(),
                    path = %req.path,
                    stage = ctx.stage(),
                    error = %e,
                    "Pipeline failed, rendering error page"
                );
                ctx.cache_status = None;
                self.error_page(&req).await
            }
        };

        (self.finalize(response, &ctx), scope)
    }

    async fn route(
        &self,
        req: &mut InternalRequest,
        scope: &RequestScope,
        ctx: &mut RequestContext,
    ) -> Result<EdgeResponse, PipelineError> {
        let manifest = &self.manifest;

        ctx.enter(Stage::Normalize);
        let url = match manifest.normalizer.normalize(req) {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "Request outside base path");
                return Ok(self.not_found_page(req).await);
            }
        };
        req.path = url.pathname.clone();
        req.locale = url.detected_locale.clone();
        ctx.config_headers = manifest.headers.collect(req, &url.pathname);
        ctx.vary_on_locale = manifest.i18n_enabled()
            && !matches!(url.locale_source, Some(LocaleSource::Path | LocaleSource::Domain));

        ctx.enter(Stage::RedirectCheck);
        if let Some(redirect) = manifest.rewrites.redirect_check(req, &url) {
            return Ok(redirect);
        }

        ctx.enter(Stage::Middleware);
        match self.middleware.run(req, scope).await? {
            MiddlewareOutcome::Skipped => {}
            MiddlewareOutcome::ShortCircuit(response) => return Ok(response),
            MiddlewareOutcome::Continue {
                rewrite,
                response_headers,
            } => {
                ctx.middleware_headers = response_headers;
                match rewrite {
                    Some(Destination::Internal { path, query }) => {
                        self.adopt_rewrite(req, &path);
                        req.query.merge(&query);
                    }
                    Some(Destination::External(target)) => {
                        return self.proxy_external(req, &target).await;
                    }
                    None => {}
                }
            }
        }

        ctx.enter(Stage::BeforeFiles);
        if let RewriteOutcome::External(target) = manifest.rewrites.apply(Phase::BeforeFiles, req) {
            return self.proxy_external(req, &target).await;
        }

        ctx.enter(Stage::AssetShortCircuit);
        if manifest.is_asset(&req.path) {
            return Ok(self.renderer.render(req, &ResolvedRoute::new(DispatchKind::Asset)).await?);
        }

        ctx.enter(Stage::StaticMatch);
        let mut resolved = manifest
            .routes
            .match_static(&req.path)
            .map(|m| self.resolve(req, m));

        if resolved.is_none() {
            ctx.enter(Stage::AfterFiles);
            match manifest.rewrites.apply(Phase::AfterFiles, req) {
                RewriteOutcome::External(target) => return self.proxy_external(req, &target).await,
                RewriteOutcome::Rewritten => {
                    resolved = manifest
                        .routes
                        .match_static(&req.path)
                        .map(|m| self.resolve(req, m));
                }
                RewriteOutcome::Unchanged => {}
            }
        }

        if resolved.is_none() {
            ctx.enter(Stage::FallbackResolve);
            if resolve_fallback(&manifest.routes, &req.path) == FallbackDecision::NotFound {
                debug!(path = %req.path, "Path not pre-generated and fallback disabled");
                return Ok(self.not_found_page(req).await);
            }

            ctx.enter(Stage::DynamicMatch);
            resolved = manifest
                .routes
                .match_dynamic(&req.path)
                .map(|m| self.resolve(req, m));
        }

        if resolved.is_none() {
            ctx.enter(Stage::FallbackRewrites);
            match manifest.rewrites.apply(Phase::Fallback, req) {
                RewriteOutcome::External(target) => return self.proxy_external(req, &target).await,
                RewriteOutcome::Rewritten => {
                    resolved = manifest.routes.resolve(&req.path).map(|m| self.resolve(req, m));
                }
                RewriteOutcome::Unchanged => {}
            }
        }

        let Some(mut resolved) = resolved else {
            return Ok(self.not_found_page(req).await);
        };

        if resolved.kind == DispatchKind::Page {
            ctx.enter(Stage::CacheIntercept);
            let key = manifest.cache_key(req.locale.as_deref(), &req.path);
            match self
                .cache
                .intercept(req, &key, resolved.revalidate, scope)
                .await
            {
                CacheDecision::Serve { response, status } => {
                    ctx.cache_status = Some(status);
                    return Ok(response);
                }
                // HEAD renders carry no body, so only GET fills the cache.
                CacheDecision::Render { status } => {
                    ctx.cache_status = Some(status);
                    if req.method == Method::GET {
                        resolved.cache_key = Some(key);
                    }
                }
                CacheDecision::Passthrough(Passthrough::Revalidate) if req.method == Method::GET => {
                    resolved.cache_key = Some(key);
                }
                CacheDecision::Passthrough(_) => {}
            }
        }

        ctx.enter(Stage::Dispatch);
        Ok(self.renderer.render(req, &resolved).await?)
    }

    fn resolve(&self, req: &InternalRequest, matched: RouteMatch<'_>) -> ResolvedRoute {
        let route = matched.route;
        let kind = match route.kind {
            RouteKind::Api => DispatchKind::Api,
            RouteKind::Static | RouteKind::Dynamic => DispatchKind::Page,
        };
        debug!(path = %req.path, page = %route.page_id, kind = kind.as_str(), "Route resolved");
        ResolvedRoute {
            kind,
            page_id: Some(route.page_id.clone()),
            params: matched.params,
            cache_key: None,
            revalidate: route.revalidate,
        }
    }

    /// Middleware rewrites name public paths; strip base path and locale.
    fn adopt_rewrite(&self, req: &mut InternalRequest, path: &str) {
        let base = self.manifest.base_path.as_str();
        let path = match path.strip_prefix(base) {
            Some("") if !base.is_empty() => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        };
        let locales = self.manifest.normalizer.locales();
        match locales.and_then(|l| l.split_path_locale(path)) {
            Some((locale, rest)) => {
                req.locale = Some(locale.to_string());
                req.path = rest.to_string();
            }
            None => req.path = path.to_string(),
        }
        debug!(path = %req.path, "Middleware rewrite applied");
    }

    async fn proxy_external(
        &self,
        req: &InternalRequest,
        target: &Url,
    ) -> Result<EdgeResponse, PipelineError> {
        Ok(self.proxy.forward(req, target).await?)
    }

    async fn not_found_page(&self, req: &InternalRequest) -> EdgeResponse {
        self.special_page(req, "/404", DispatchKind::NotFound, StatusCode::NOT_FOUND)
            .await
            .unwrap_or_else(EdgeResponse::not_found)
    }

    async fn error_page(&self, req: &InternalRequest) -> EdgeResponse {
        self.special_page(req, "/500", DispatchKind::Error, StatusCode::INTERNAL_SERVER_ERROR)
            .await
            .unwrap_or_else(EdgeResponse::internal_error)
    }

    /// Render the configured `/404` or `/500` page with its fixed status.
    async fn special_page(
        &self,
        req: &InternalRequest,
        page: &str,
        kind: DispatchKind,
        status: StatusCode,
    ) -> Option<EdgeResponse> {
        let route = self.manifest.routes.page(page)?;
        let mut synthetic = req.clone();
        synthetic.method = Method::GET;
        synthetic.path = page.to_string();
        synthetic.query = Default::default();
        synthetic.body = Default::default();

        let resolved = ResolvedRoute {
            kind,
            page_id: Some(route.page_id.clone()),
            ..ResolvedRoute::new(kind)
        };
        match self.renderer.render(&synthetic, &resolved).await {
            Ok(mut response) => {
                response.status = status;
                Some(response)
            }
            Err(e) => {
                warn!(page, error = %e, "Special page render failed");
                None
            }
        }
    }

    fn finalize(&self, mut response: EdgeResponse, ctx: &RequestContext) -> EdgeResponse {
        merge_response_headers(
            &mut response.headers,
            &ctx.config_headers,
            &ctx.middleware_headers,
            self.manifest.header_precedence,
        );
        if let Some(status) = ctx.cache_status {
            if !response.headers.contains_key(self.cache.status_header()) {
                self.cache.mark(&mut response, status);
            }
        }
        if ctx.vary_on_locale {
            response
                .headers
                .append_str(header::VARY.as_str(), "accept-language, cookie");
        }
        response
    }
}

#[async_trait]
impl Revalidator for Pipeline {
    async fn revalidate(&self, job: &RevalidationJob) -> StatusCode {
        let url = format!("http://{}{}", job.host, self.manifest.public_path(&job.path));
        let req = InternalRequest::new(Method::GET, &url)
            .with_header(REVALIDATE_HEADER, self.revalidate_token());
        let (response, scope) = self.handle(req).await;
        scope.finish().await;
        response.status
    }
}
