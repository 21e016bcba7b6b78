//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a catch-all handler feeding the pipeline
//! - Wire up layers (timeout, tracing, request ID)
//! - Buffer request bodies up to the configured limit
//! - Await each request's background work after the response is sent
//! - Serve until the shared shutdown signal fires

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::http::headers::HeaderMapExt;
use crate::http::request::InternalRequest;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::Pipeline;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub max_body_bytes: usize,
}

/// Public HTTP server of the edge router.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(pipeline: Arc<Pipeline>, config: &RouterConfig) -> Self {
        Self {
            router: build_router(pipeline, config),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(pipeline: Arc<Pipeline>, config: &RouterConfig) -> Router {
    let state = AppState {
        pipeline,
        max_body_bytes: config.listener.max_body_bytes,
    };
    Router::new()
        .route("/{*path}", any(edge_handler))
        .route("/", any(edge_handler))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Main handler: every path goes through the routing pipeline.
async fn edge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Rejected request body");
            metrics::record_request(&method, 413, "none", start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let req = InternalRequest::from_parts(parts.method, &parts.uri, parts.headers, body);
    let request_id = req.request_id().to_string();
    let path = req.raw_path.clone();

    let (response, scope) = state.pipeline.handle(req).await;

    let status_header = &state.pipeline.manifest().status_header;
    let cache = response
        .headers
        .get_str(status_header.as_str())
        .unwrap_or("none")
        .to_string();
    metrics::record_request(&method, response.status.as_u16(), &cache, start);
    tracing::debug!(
        request_id = %request_id,
        path = %path,
        status = response.status.as_u16(),
        cache = %cache,
        "Request handled"
    );

    if scope.pending() > 0 {
        tokio::spawn(scope.finish());
    }
    response.into_response()
}
