//! Middleware, header precedence and error-page behavior of the pipeline.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;

use common::{header, Harness};
use edge_router::error::MiddlewareError;
use edge_router::http::headers::HeaderMapExt;
use edge_router::http::request::InternalRequest;
use edge_router::http::response::EdgeResponse;
use edge_router::middleware::executor::{Middleware, MiddlewareRequest};
use edge_router::middleware::tasks::RequestScope;
use edge_router::upstream::renderer::DispatchKind;

/// Path-driven middleware covering each response shape.
#[derive(Default)]
struct ScriptedMiddleware {
    background_done: Arc<AtomicBool>,
}

fn next(pairs: &[(&str, &str)]) -> EdgeResponse {
    let mut headers = HeaderMap::new();
    headers.set_str("x-middleware-next", "1");
    for (name, value) in pairs {
        headers.append_str(name, value);
    }
    EdgeResponse::new(StatusCode::OK, headers, Bytes::new())
}

#[async_trait]
impl Middleware for ScriptedMiddleware {
    async fn invoke(
        &self,
        request: MiddlewareRequest,
        scope: &RequestScope,
    ) -> Result<EdgeResponse, MiddlewareError> {
        match request.path.as_str() {
            "/blocked" => Ok(EdgeResponse::text(StatusCode::FORBIDDEN, "denied")),
            "/crash" => Err(MiddlewareError::Execution("middleware threw".into())),
            "/go-dashboard" => {
                let mut headers = HeaderMap::new();
                headers.set_str("x-middleware-rewrite", "/dashboard?from=mw");
                Ok(EdgeResponse::new(StatusCode::OK, headers, Bytes::new()))
            }
            "/go-external" => {
                let mut headers = HeaderMap::new();
                headers.set_str("x-middleware-rewrite", "https://api.example/v1");
                Ok(EdgeResponse::new(StatusCode::OK, headers, Bytes::new()))
            }
            _ => {
                let done = self.background_done.clone();
                scope.wait_until(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    done.store(true, Ordering::SeqCst);
                });
                Ok(next(&[
                    ("x-middleware-request-x-user", "alice"),
                    ("x-middleware-response-x-frame-options", "SAMEORIGIN"),
                    ("x-middleware-response-x-served-by", "mw"),
                ]))
            }
        }
    }
}

fn config(precedence: &str) -> String {
    format!(
        r#"
[middleware]
header_precedence = "{precedence}"

[[headers]]
source = "/:path*"
headers = [{{ key = "x-frame-options", value = "DENY" }}]

[[routes]]
page = "/dashboard"
kind = "static"

[[routes]]
page = "/500"
kind = "static"

[[routes]]
page = "/boom"
kind = "static"
"#
    )
}

fn harness(precedence: &str) -> (Harness, Arc<AtomicBool>) {
    let middleware = ScriptedMiddleware::default();
    let done = middleware.background_done.clone();
    let h = Harness::with_middleware(&config(precedence), Some(Arc::new(middleware)));
    (h, done)
}

#[tokio::test]
async fn test_short_circuit_skips_rendering() {
    let (h, _) = harness("config");

    let response = h.get("/blocked").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body, "denied");
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_request_headers_reach_renderer() {
    let (h, _) = harness("config");

    let response = h.get("/dashboard").await;
    assert_eq!(response.status, StatusCode::OK);
    let call = h.renderer.last_call();
    assert_eq!(call.headers.get_str("x-user"), Some("alice"));
    assert!(call.headers.get("x-middleware-request-x-user").is_none());
    assert_eq!(header(&response, "x-served-by"), Some("mw"));
}

#[tokio::test]
async fn test_config_headers_win_by_default() {
    let (h, _) = harness("config");
    let response = h.get("/dashboard").await;
    assert_eq!(header(&response, "x-frame-options"), Some("DENY"));
}

#[tokio::test]
async fn test_middleware_precedence_overrides_config() {
    let (h, _) = harness("middleware");
    let response = h.get("/dashboard").await;
    assert_eq!(header(&response, "x-frame-options"), Some("SAMEORIGIN"));
}

#[tokio::test]
async fn test_internal_rewrite_merges_query() {
    let (h, _) = harness("config");

    let response = h.get("/go-dashboard?tab=2").await;
    assert_eq!(response.status, StatusCode::OK);
    let call = h.renderer.last_call();
    assert_eq!(call.path, "/dashboard");
    assert_eq!(call.query, "tab=2&from=mw");
}

#[tokio::test]
async fn test_external_rewrite_is_proxied() {
    let (h, _) = harness("config");

    let response = h.get("/go-external").await;
    assert_eq!(response.body, "external");
    assert_eq!(h.proxy.targets(), vec!["https://api.example/v1".to_string()]);
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_background_work_outlives_response() {
    let (h, done) = harness("config");

    let (response, scope) = h
        .pipeline
        .handle(InternalRequest::new(Method::GET, "/dashboard"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(scope.pending(), 1);
    assert!(!done.load(Ordering::SeqCst));

    scope.finish().await;
    assert!(done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_middleware_error_renders_500_page() {
    let (h, _) = harness("config");

    let response = h.get("/crash").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, "error:/500:/500");
    let call = h.renderer.last_call();
    assert_eq!(call.kind, DispatchKind::Error);
    assert_eq!(call.path, "/500");
    // Static headers still apply to error pages.
    assert_eq!(header(&response, "x-frame-options"), Some("DENY"));
}

#[tokio::test]
async fn test_render_failure_renders_500_page() {
    let (h, _) = harness("config");
    h.renderer.fail_on("/boom");

    let response = h.get("/boom").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, "error:/500:/500");
    assert!(header(&response, "x-edge-cache").is_none());
}

#[tokio::test]
async fn test_plain_500_without_error_page() {
    let middleware: Arc<dyn Middleware> = Arc::new(ScriptedMiddleware::default());
    let h = Harness::with_middleware(
        r#"
[[routes]]
page = "/dashboard"
kind = "static"
"#,
        Some(middleware),
    );

    let response = h.get("/crash").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.renderer.calls().is_empty());
}
