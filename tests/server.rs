//! HTTP surface and origin round trips.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{header, start_echo_origin, start_mock_origin, Harness, RecordingProxy, T};
use edge_router::cache::entry::CacheKind;
use edge_router::cache::store::{CacheStore, MemoryCacheStore};
use edge_router::clock::ManualClock;
use edge_router::http::build_router;
use edge_router::lifecycle::Shutdown;
use edge_router::pipeline::{Collaborators, Manifest, Pipeline};
use edge_router::revalidation::{MemoryQueue, RevalidationWorker};
use edge_router::upstream::OriginRenderer;

const SITE: &str = r#"
[listener]
max_body_bytes = 16

[[routes]]
page = "/admin"
kind = "static"
revalidate = 60

[[routes]]
page = "/api/orders"
kind = "api"
"#;

#[tokio::test]
async fn test_router_routes_through_pipeline() {
    let h = Harness::new(SITE);
    let app = build_router(h.pipeline.clone(), &h.config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin")
                .header("host", "pos.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-edge-cache").unwrap(), "MISS");
    assert!(response.headers().get("x-request-id").is_some());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"page:/admin:/admin");
}

#[tokio::test]
async fn test_api_routes_are_not_cached() {
    let h = Harness::new(SITE);
    let app = build_router(h.pipeline.clone(), &h.config);

    let response = app
        .oneshot(Request::post("/api/orders").body(Body::from("{}")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-edge-cache").is_none());
    assert!(h.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let h = Harness::new(SITE);
    let app = build_router(h.pipeline.clone(), &h.config);

    let response = app
        .oneshot(
            Request::post("/api/orders")
                .body(Body::from(vec![b'x'; 64]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_client_request_id_is_kept() {
    let h = Harness::new(SITE);
    let app = build_router(h.pipeline.clone(), &h.config);

    let response = app
        .oneshot(
            Request::get("/admin")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-123");
    assert_eq!(h.renderer.last_call().headers.get("x-request-id").unwrap(), "req-123");
}

#[tokio::test]
async fn test_origin_round_trip_and_background_regeneration() {
    let (addr, hits) = start_mock_origin(
        200,
        &[
            ("Content-Type", "text/html"),
            ("Cache-Control", "s-maxage=60"),
            ("X-Cache-Tags", "product:42"),
        ],
        "origin",
    )
    .await;

    let config = common::config(&format!(
        r#"
[origin]
url = "http://{addr}"

[[routes]]
page = "/shop/[id]"
kind = "dynamic"
revalidate = 60
"#
    ));

    let store = Arc::new(MemoryCacheStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let (queue, receivers) = MemoryQueue::new(2, Duration::from_secs(300), clock.clone());
    let renderer = OriginRenderer::new(
        config.origin.url.clone(),
        Duration::from_secs(5),
        store.clone(),
        clock.clone(),
    );
    let collaborators = Collaborators {
        renderer: Arc::new(renderer),
        store: store.clone(),
        queue: Arc::new(queue),
        shard_count: 2,
        proxy: Arc::new(RecordingProxy::default()),
        middleware: None,
        clock: clock.clone(),
    };
    let pipeline = Arc::new(Pipeline::new(Manifest::compile(&config).unwrap(), collaborators).unwrap());

    let shutdown = Shutdown::new();
    let workers = RevalidationWorker::new(pipeline.clone()).spawn(receivers, &shutdown);

    let get = |pipeline: Arc<Pipeline>| async move {
        let req = edge_router::http::InternalRequest::new(axum::http::Method::GET, "/shop/42");
        let (response, scope) = pipeline.handle(req).await;
        scope.finish().await;
        response
    };

    let miss = get(pipeline.clone()).await;
    assert_eq!(miss.status, StatusCode::OK);
    assert_eq!(header(&miss, "x-edge-cache"), Some("MISS"));
    assert_eq!(miss.body, "origin#1");
    assert!(miss.headers.get("x-cache-tags").is_none());

    let entry = store.get("/shop/42").await.unwrap().unwrap();
    assert_eq!(entry.value.kind, CacheKind::App);
    assert_eq!(entry.tags.len(), 1);
    assert!(entry.tags.contains("product:42"));

    clock.set(T + 1_000);
    let hit = get(pipeline.clone()).await;
    assert_eq!(header(&hit, "x-edge-cache"), Some("HIT"));
    assert_eq!(hit.body, "origin#1");

    clock.set(T + 61_000);
    let stale = get(pipeline.clone()).await;
    assert_eq!(header(&stale, "x-edge-cache"), Some("STALE"));
    assert_eq!(stale.body, "origin#1");

    let mut regenerated = false;
    for _ in 0..100 {
        let entry = store.get("/shop/42").await.unwrap().unwrap();
        if entry.last_modified == T + 61_000 {
            regenerated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(regenerated, "worker never regenerated the entry");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let fresh = get(pipeline.clone()).await;
    assert_eq!(header(&fresh, "x-edge-cache"), Some("HIT"));
    assert_eq!(fresh.body, "origin#2");

    shutdown.trigger();
    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test]
async fn test_origin_failure_yields_500() {
    let config = common::config(
        r#"
[origin]
url = "http://127.0.0.1:1"

[[routes]]
page = "/admin"
kind = "static"
"#,
    );
    let store = Arc::new(MemoryCacheStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let (queue, _receivers) = MemoryQueue::new(1, Duration::from_secs(300), clock.clone());
    let collaborators = Collaborators {
        renderer: Arc::new(OriginRenderer::new(
            config.origin.url.clone(),
            Duration::from_secs(2),
            store.clone(),
            clock.clone(),
        )),
        store: store.clone(),
        queue: Arc::new(queue),
        shard_count: 1,
        proxy: Arc::new(RecordingProxy::default()),
        middleware: None,
        clock,
    };
    let pipeline = Pipeline::new(Manifest::compile(&config).unwrap(), collaborators).unwrap();

    let (response, scope) = pipeline
        .handle(edge_router::http::InternalRequest::new(axum::http::Method::GET, "/admin"))
        .await;
    scope.finish().await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(store.get("/admin").await.unwrap().is_none());
}

fn origin_pipeline(raw: &str) -> (Pipeline, Arc<MemoryCacheStore>) {
    let config = common::config(raw);
    let store = Arc::new(MemoryCacheStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let (queue, _receivers) = MemoryQueue::new(1, Duration::from_secs(300), clock.clone());
    let collaborators = Collaborators {
        renderer: Arc::new(OriginRenderer::new(
            config.origin.url.clone(),
            Duration::from_secs(5),
            store.clone(),
            clock.clone(),
        )),
        store: store.clone(),
        queue: Arc::new(queue),
        shard_count: 1,
        proxy: Arc::new(RecordingProxy::default()),
        middleware: None,
        clock,
    };
    let pipeline = Pipeline::new(Manifest::compile(&config).unwrap(), collaborators).unwrap();
    (pipeline, store)
}

#[tokio::test]
async fn test_head_miss_does_not_fill_cache() {
    let (addr, hits) = start_mock_origin(200, &[("Content-Type", "text/html")], "origin").await;
    let (pipeline, store) = origin_pipeline(&format!(
        r#"
[origin]
url = "http://{addr}"

[[routes]]
page = "/admin"
kind = "static"
revalidate = 60
"#
    ));

    let send = |method: axum::http::Method| {
        let pipeline = &pipeline;
        async move {
            let req = edge_router::http::InternalRequest::new(method, "/admin");
            let (response, scope) = pipeline.handle(req).await;
            scope.finish().await;
            response
        }
    };

    let head = send(axum::http::Method::HEAD).await;
    assert_eq!(head.status, StatusCode::OK);
    assert_eq!(header(&head, "x-edge-cache"), Some("MISS"));
    assert!(store.get("/admin").await.unwrap().is_none());

    let get = send(axum::http::Method::GET).await;
    assert_eq!(header(&get, "x-edge-cache"), Some("MISS"));
    assert_eq!(get.body, "origin#2");

    let hit = send(axum::http::Method::GET).await;
    assert_eq!(header(&hit, "x-edge-cache"), Some("HIT"));
    assert_eq!(hit.body, "origin#2");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_fill_is_requested_unencoded() {
    let addr = start_echo_origin().await;
    let (pipeline, store) = origin_pipeline(&format!(
        r#"
[origin]
url = "http://{addr}"

[[routes]]
page = "/admin"
kind = "static"
revalidate = 60

[[routes]]
page = "/api/orders"
kind = "api"
"#
    ));

    let send = |path: &'static str| {
        let pipeline = &pipeline;
        async move {
            let req = edge_router::http::InternalRequest::new(axum::http::Method::GET, path)
                .with_header("accept-encoding", "gzip");
            let (response, scope) = pipeline.handle(req).await;
            scope.finish().await;
            response
        }
    };

    let page = send("/admin").await;
    assert_eq!(header(&page, "x-edge-cache"), Some("MISS"));
    let echoed = String::from_utf8_lossy(&page.body).into_owned();
    assert!(echoed.starts_with("get /admin"), "{echoed}");
    assert!(!echoed.contains("accept-encoding"), "{echoed}");
    assert!(store.get("/admin").await.unwrap().is_some());

    // Uncached renders pass the client's encoding preference through.
    let api = send("/api/orders").await;
    assert!(String::from_utf8_lossy(&api.body).contains("accept-encoding: gzip"));
}
