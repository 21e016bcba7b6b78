//! Middleware invocation and response reconciliation.
//!
//! # Responsibilities
//! - Run the user middleware once per request whose path it declares
//! - Hand it the request plus geo, client IP and locale metadata
//! - Translate its response into continue, rewrite or short-circuit
//!
//! # Protocol
//! - `x-middleware-next`: proceed with the (possibly modified) request
//! - `x-middleware-rewrite`: proceed with this path or URL instead
//! - `x-middleware-request-<name>`: set `<name>` on the forwarded request
//! - `x-middleware-override-headers`: the forwarded request keeps only the listed headers
//! - `x-middleware-response-<name>`: set `<name>` on the final response
//! - anything else: the response itself is returned to the client

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, Method};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::error::MiddlewareError;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;
use crate::middleware::tasks::RequestScope;
use crate::observability::metrics;
use crate::rewrite::destination::Destination;
use crate::routing::matcher::PathPattern;

pub const MIDDLEWARE_NEXT: &str = "x-middleware-next";
pub const MIDDLEWARE_REWRITE: &str = "x-middleware-rewrite";
pub const MIDDLEWARE_OVERRIDE_HEADERS: &str = "x-middleware-override-headers";
const REQUEST_PREFIX: &str = "x-middleware-request-";
const RESPONSE_PREFIX: &str = "x-middleware-response-";
const INTERNAL_PREFIX: &str = "x-middleware-";

/// Headers of a continue response that describe the response itself, not the page.
const TRANSPORT_HEADERS: &[&str] = &[
    "content-length",
    "content-type",
    "date",
    "connection",
    "keep-alive",
    "transfer-encoding",
];

/// Geo data supplied by the edge in `x-geo-*` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// What the middleware sees. A snapshot; changes go through its response.
#[derive(Debug, Clone)]
pub struct MiddlewareRequest {
    pub method: Method,
    pub url: String,
    pub path: String,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    pub body: Bytes,
    pub geo: Geo,
    pub ip: Option<String>,
    pub locale: Option<String>,
}

impl MiddlewareRequest {
    pub fn from_request(req: &InternalRequest) -> Self {
        let header = |name: &str| req.headers.get_str(name).map(str::to_string);
        Self {
            method: req.method.clone(),
            url: req.url(),
            path: req.path.clone(),
            headers: req.headers.clone(),
            cookies: req.cookies.clone(),
            body: req.body.clone(),
            geo: Geo {
                country: header("x-geo-country"),
                region: header("x-geo-region"),
                city: header("x-geo-city"),
            },
            ip: req.client_ip().map(str::to_string),
            locale: req.locale.clone(),
        }
    }
}

/// User-supplied request interceptor.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handle one request. Background work goes on `scope`.
    async fn invoke(
        &self,
        request: MiddlewareRequest,
        scope: &RequestScope,
    ) -> Result<EdgeResponse, MiddlewareError>;
}

/// Reconciled middleware result.
#[derive(Debug, Clone)]
pub enum MiddlewareOutcome {
    /// No middleware, or its matcher did not cover the path.
    Skipped,
    /// Continue the pipeline, optionally at another destination.
    Continue {
        rewrite: Option<Destination>,
        response_headers: HeaderMap,
    },
    /// Answer the client with this response.
    ShortCircuit(EdgeResponse),
}

impl MiddlewareOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MiddlewareOutcome::Skipped => "skipped",
            MiddlewareOutcome::Continue { rewrite: None, .. } => "continue",
            MiddlewareOutcome::Continue { rewrite: Some(_), .. } => "rewrite",
            MiddlewareOutcome::ShortCircuit(_) => "short_circuit",
        }
    }
}

/// Runs the configured middleware, if any.
#[derive(Clone)]
pub struct MiddlewareExecutor {
    middleware: Option<Arc<dyn Middleware>>,
    matchers: Vec<PathPattern>,
    timeout: Duration,
}

impl std::fmt::Debug for MiddlewareExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareExecutor")
            .field("enabled", &self.middleware.is_some())
            .field("matchers", &self.matchers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MiddlewareExecutor {
    pub fn new(
        middleware: Option<Arc<dyn Middleware>>,
        matchers: &[String],
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            middleware,
            matchers: matchers
                .iter()
                .map(|m| PathPattern::rule(m))
                .collect::<Result<_, _>>()?,
            timeout,
        })
    }

    pub fn disabled() -> Self {
        Self {
            middleware: None,
            matchers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// True when the middleware runs for `path`.
    pub fn applies_to(&self, path: &str) -> bool {
        self.middleware.is_some()
            && (self.matchers.is_empty() || self.matchers.iter().any(|m| m.is_match(path)))
    }

    /// Invoke the middleware and apply its request-header changes to `req`.
    pub async fn run(
        &self,
        req: &mut InternalRequest,
        scope: &RequestScope,
    ) -> Result<MiddlewareOutcome, MiddlewareError> {
        let outcome = self.invoke(req, scope).await;
        let label = match &outcome {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        metrics::record_middleware_outcome(label);
        outcome
    }

    async fn invoke(
        &self,
        req: &mut InternalRequest,
        scope: &RequestScope,
    ) -> Result<MiddlewareOutcome, MiddlewareError> {
        let Some(middleware) = self.middleware.as_ref().filter(|_| self.applies_to(&req.path))
        else {
            return Ok(MiddlewareOutcome::Skipped);
        };

        let request = MiddlewareRequest::from_request(req);
        let response = tokio::time::timeout(self.timeout, middleware.invoke(request, scope))
            .await
            .map_err(|_| MiddlewareError::Timeout)??;

        reconcile(req, response)
    }
}

/// Interpret a middleware response, updating the forwarded request headers.
pub fn reconcile(
    req: &mut InternalRequest,
    response: EdgeResponse,
) -> Result<MiddlewareOutcome, MiddlewareError> {
    let rewrite = match response.headers.get_str(MIDDLEWARE_REWRITE) {
        Some(target) => Some(
            Destination::parse(target)
                .map(|d| d.relative_to(req.hostname()))
                .map_err(|_| MiddlewareError::InvalidRewrite(target.to_string()))?,
        ),
        None => None,
    };

    if rewrite.is_none() && response.headers.get(MIDDLEWARE_NEXT).is_none() {
        debug!(status = %response.status, "middleware answered the request");
        return Ok(MiddlewareOutcome::ShortCircuit(strip_internal(response)));
    }

    apply_request_headers(req, &response.headers);

    let mut response_headers = HeaderMap::new();
    for (name, value) in &response.headers {
        let name = name.as_str();
        let target = if let Some(stripped) = name.strip_prefix(RESPONSE_PREFIX) {
            stripped
        } else if name.starts_with(INTERNAL_PREFIX) || TRANSPORT_HEADERS.contains(&name) {
            continue;
        } else {
            name
        };
        match (HeaderName::from_bytes(target.as_bytes()), value.to_str()) {
            (Ok(target), Ok(_)) => {
                response_headers.append(target, value.clone());
            }
            _ => warn!(header = name, "dropping unusable middleware response header"),
        }
    }

    Ok(MiddlewareOutcome::Continue {
        rewrite,
        response_headers,
    })
}

fn apply_request_headers(req: &mut InternalRequest, headers: &HeaderMap) {
    if let Some(list) = headers.get_str(MIDDLEWARE_OVERRIDE_HEADERS) {
        let mut forwarded = HeaderMap::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let source = format!("{REQUEST_PREFIX}{name}");
            for value in headers.get_all_str(&source) {
                forwarded.append_str(name, value);
            }
        }
        req.headers = forwarded;
    } else {
        for (name, value) in headers {
            if let Some(target) = name.as_str().strip_prefix(REQUEST_PREFIX) {
                if let Ok(value) = value.to_str() {
                    req.headers.set_str(target, value);
                }
            }
        }
    }
    req.refresh_cookies();
}

fn strip_internal(mut response: EdgeResponse) -> EdgeResponse {
    let internal: Vec<HeaderName> = response
        .headers
        .keys()
        .filter(|name| name.as_str().starts_with(INTERNAL_PREFIX))
        .cloned()
        .collect();
    for name in internal {
        response.headers.remove(name);
    }
    response
}
