//! Middleware hosted behind an HTTP endpoint.
//!
//! The endpoint receives the request as the client sent it, plus geo, IP and
//! locale metadata in `x-edge-*` headers, and answers using the
//! `x-middleware-*` protocol.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::debug;

use crate::error::MiddlewareError;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::http::response::EdgeResponse;
use crate::middleware::executor::{Middleware, MiddlewareRequest};
use crate::middleware::tasks::RequestScope;
use crate::upstream::client::{self, HttpClient};

pub struct HttpMiddleware {
    client: HttpClient,
    endpoint: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMiddleware")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpMiddleware {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: client::build_client(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

fn metadata(request: &MiddlewareRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let fields = [
        ("x-edge-geo-country", &request.geo.country),
        ("x-edge-geo-region", &request.geo.region),
        ("x-edge-geo-city", &request.geo.city),
        ("x-edge-ip", &request.ip),
        ("x-edge-locale", &request.locale),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            headers.set_str(name, value);
        }
    }
    headers
}

#[async_trait]
impl Middleware for HttpMiddleware {
    async fn invoke(
        &self,
        request: MiddlewareRequest,
        _scope: &RequestScope,
    ) -> Result<EdgeResponse, MiddlewareError> {
        let uri: axum::http::Uri = request
            .url
            .parse()
            .map_err(|_| MiddlewareError::Execution(format!("invalid url `{}`", request.url)))?;
        let mut forwarded =
            InternalRequest::from_parts(request.method.clone(), &uri, request.headers.clone(), request.body.clone());
        forwarded.path = request.path.clone();

        let outbound = client::forward_request(&self.endpoint, &forwarded, &metadata(&request))
            .map_err(|e| MiddlewareError::Execution(e.to_string()))?;
        let response = client::send(&self.client, outbound, self.timeout)
            .await
            .map_err(|e| MiddlewareError::Execution(e.to_string()))?;

        debug!(endpoint = %self.endpoint, status = %response.status, "Middleware endpoint answered");
        Ok(response)
    }
}
