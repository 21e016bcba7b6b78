//! Response handling and transformation.
//!
//! # Responsibilities
//! - Represent pipeline responses as plain values (status, headers, body)
//! - Build redirect, not-found and error responses
//! - Convert into an Axum response at the edge of the server
//!
//! # Design Decisions
//! - Bodies are fully buffered: cached artifacts are replayed byte-for-byte
//! - Hop-by-hop headers are stripped when adopting upstream responses

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::http::headers::HeaderMapExt;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A buffered HTTP response produced by the pipeline.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EdgeResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.set_str("content-type", "text/plain; charset=utf-8");
        Self::new(status, headers, body)
    }

    /// Redirect with the given status and `Location`.
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.set_str("location", location);
        // Some legacy clients only understand the refresh header for 308.
        if status == StatusCode::PERMANENT_REDIRECT {
            headers.set_str("refresh", &format!("0;url={location}"));
        }
        Self::new(status, headers, Bytes::new())
    }

    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn internal_error() -> Self {
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    /// `Location` header, if any.
    pub fn location(&self) -> Option<&str> {
        self.headers.get_str(header::LOCATION.as_str())
    }

    /// Drop connection-scoped headers copied from an upstream.
    pub fn strip_hop_by_hop(&mut self) {
        for name in HOP_BY_HOP {
            self.headers.remove(*name);
        }
    }
}

impl IntoResponse for EdgeResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
