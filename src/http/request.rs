//! Request handling and transformation.
//!
//! # Responsibilities
//! - Build the per-request `InternalRequest` event from the inbound request
//! - Extract routing-relevant information (host, path, query, cookies)
//! - Carry the request through the pipeline while stages rewrite it
//!
//! # Design Decisions
//! - Cookies and query are parsed eagerly into plain values
//! - The raw path is preserved for logging; `path` is what stages rewrite
//! - An event is owned by exactly one request and never shared

use std::collections::BTreeMap;

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;

use crate::http::headers::{parse_cookies, HeaderMapExt, Query};

/// Header carrying the request ID, set by the request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Per-request event flowing through the routing pipeline.
#[derive(Debug, Clone)]
pub struct InternalRequest {
    pub method: Method,
    /// `http` or `https`.
    pub scheme: String,
    /// Host including port, as the client sent it.
    pub host: String,
    /// Path exactly as received, before any normalization.
    pub raw_path: String,
    /// Effective path; rewritten by the pipeline.
    pub path: String,
    pub query: Query,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    pub body: Bytes,
    /// Locale resolved by the normalizer, if i18n is enabled.
    pub locale: Option<String>,
}

impl InternalRequest {
    /// Build an event from the pieces of an inbound HTTP request.
    pub fn from_parts(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        let host = headers
            .get_str("x-forwarded-host")
            .or_else(|| headers.get_str("host"))
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());
        let scheme = headers
            .get_str("x-forwarded-proto")
            .map(str::to_string)
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        let path = uri.path().to_string();
        let query = uri.query().map(Query::parse).unwrap_or_default();
        let cookies = parse_cookies(&headers);

        Self {
            method,
            scheme,
            host,
            raw_path: path.clone(),
            path,
            query,
            headers,
            cookies,
            body,
            locale: None,
        }
    }

    /// Build a bodiless event from an absolute or origin-form URL.
    pub fn new(method: Method, url: &str) -> Self {
        let uri: Uri = url.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::from_parts(method, &uri, HeaderMap::new(), Bytes::new())
    }

    /// Add a header, refreshing the derived cookie map.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append_str(name, value);
        if name.eq_ignore_ascii_case("cookie") {
            self.cookies = parse_cookies(&self.headers);
        }
        self
    }

    /// Host without the port.
    pub fn hostname(&self) -> &str {
        strip_port(&self.host)
    }

    /// Effective path plus query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query.to_query_string())
        }
    }

    /// Absolute URL of the effective request.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_and_query())
    }

    /// First address from `x-forwarded-for`.
    pub fn client_ip(&self) -> Option<&str> {
        self.headers
            .get_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }

    /// Request ID assigned by the request-id layer.
    pub fn request_id(&self) -> &str {
        self.headers.get_str(X_REQUEST_ID).unwrap_or("unknown")
    }

    /// Re-derive cookies after headers were replaced wholesale.
    pub fn refresh_cookies(&mut self) {
        self.cookies = parse_cookies(&self.headers);
    }
}

/// Strip a `:port` suffix from a host, leaving IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_once(']').map(|(h, _)| &host[..=h.len()]).unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}
