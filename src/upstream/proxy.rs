//! Proxying of external rewrites.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header;
use tracing::debug;
use url::Url;

use crate::error::ProxyError;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;

/// Fetches a rewrite destination that lives on another host.
#[async_trait]
pub trait ExternalProxy: Send + Sync {
    async fn forward(&self, req: &InternalRequest, target: &Url) -> Result<EdgeResponse, ProxyError>;
}

/// `reqwest` based proxy; supports `https` destinations.
#[derive(Debug, Clone)]
pub struct HttpExternalProxy {
    client: reqwest::Client,
}

impl HttpExternalProxy {
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Request(format!("failed to build client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ExternalProxy for HttpExternalProxy {
    async fn forward(&self, req: &InternalRequest, target: &Url) -> Result<EdgeResponse, ProxyError> {
        if !matches!(target.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidUrl(target.to_string()));
        }

        let mut headers = req.headers.clone();
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        headers.set_str("x-forwarded-host", &req.host);

        debug!(target = %target, "Proxying external rewrite");
        let response = self
            .client
            .request(req.method.clone(), target.clone())
            .headers(headers)
            .body(req.body.clone())
            .send()
            .await
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let mut out = EdgeResponse::new(status, headers, body);
        out.strip_hop_by_hop();
        out.headers.remove(header::CONTENT_LENGTH);
        Ok(out)
    }
}
