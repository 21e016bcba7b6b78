//! Plain-HTTP client shared by the origin renderer and the middleware endpoint.

use std::time::Duration;

use axum::http::{header, HeaderMap};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::http::headers::HeaderMapExt;
use crate::http::request::{InternalRequest, X_REQUEST_ID};
use crate::http::response::EdgeResponse;

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Connection-scoped request headers never forwarded upstream.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, Error)]
pub enum UpstreamFailure {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream timed out")]
    Timeout,
}

pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Build a request for `{base}{path_and_query}` carrying the forwarded headers of `req`.
pub fn forward_request(
    base: &str,
    req: &InternalRequest,
    extra: &HeaderMap,
) -> Result<Request<Full<Bytes>>, UpstreamFailure> {
    let uri = format!("{}{}", base.trim_end_matches('/'), req.path_and_query());
    let mut builder = Request::builder().method(req.method.clone()).uri(&uri);

    let Some(headers) = builder.headers_mut() else {
        return Err(UpstreamFailure::InvalidRequest(uri));
    };
    for (name, value) in &req.headers {
        if name == header::HOST || HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.set_str("x-forwarded-host", &req.host);
    headers.set_str("x-forwarded-proto", &req.scheme);
    headers.set_str(X_REQUEST_ID, req.request_id());
    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }

    builder
        .body(Full::new(req.body.clone()))
        .map_err(|e| UpstreamFailure::InvalidRequest(e.to_string()))
}

/// Send and buffer the whole response.
pub async fn send(
    client: &HttpClient,
    request: Request<Full<Bytes>>,
    timeout: Duration,
) -> Result<EdgeResponse, UpstreamFailure> {
    let exchange = async {
        let response: Response<Incoming> = client
            .request(request)
            .await
            .map_err(|e| UpstreamFailure::Transport(e.to_string()))?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| UpstreamFailure::Transport(e.to_string()))?
            .to_bytes();
        Ok(EdgeResponse::new(parts.status, parts.headers, body))
    };

    let mut response = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| UpstreamFailure::Timeout)??;
    response.strip_hop_by_hop();
    response.headers.remove(header::CONTENT_LENGTH);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_forward_request_rewrites_target_and_headers() {
        let mut req = InternalRequest::new(Method::GET, "http://pos.example/ignored")
            .with_header("connection", "keep-alive")
            .with_header("accept", "text/html");
        req.path = "/products/42".into();
        req.query.set("ref", "home");

        let mut extra = HeaderMap::new();
        extra.set_str("x-edge-page", "/products/[id]");
        let built = forward_request("http://127.0.0.1:3000/", &req, &extra).unwrap();

        assert_eq!(built.uri(), "http://127.0.0.1:3000/products/42?ref=home");
        let headers = built.headers();
        assert!(headers.get("connection").is_none());
        assert!(headers.get("host").is_none());
        assert_eq!(headers.get_str("accept"), Some("text/html"));
        assert_eq!(headers.get_str("x-forwarded-host"), Some("pos.example"));
        assert_eq!(headers.get_str("x-edge-page"), Some("/products/[id]"));
    }
}
