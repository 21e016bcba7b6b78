//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use edge_router::cache::entry::{CacheEntry, CacheKind, CacheMeta, CacheValue};
use edge_router::cache::store::{CacheStore, MemoryCacheStore};
use edge_router::clock::{Clock, ManualClock};
use edge_router::config::{parse_config, RouterConfig};
use edge_router::error::{ProxyError, RenderError};
use edge_router::http::headers::HeaderMapExt;
use edge_router::http::request::InternalRequest;
use edge_router::http::response::EdgeResponse;
use edge_router::middleware::executor::Middleware;
use edge_router::pipeline::{Collaborators, Manifest, Pipeline};
use edge_router::revalidation::job::RevalidationJob;
use edge_router::revalidation::queue::{MemoryQueue, ShardReceiver};
use edge_router::routing::matcher::Params;
use edge_router::upstream::proxy::ExternalProxy;
use edge_router::upstream::renderer::{cache_entry_for, DispatchKind, Renderer, ResolvedRoute};

/// Fixed start time for every harness clock.
pub const T: u64 = 1_700_000_000_000;

pub fn config(raw: &str) -> RouterConfig {
    parse_config(raw).expect("test config must be valid")
}

/// One call the renderer received.
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub path: String,
    pub query: String,
    pub kind: DispatchKind,
    pub page_id: Option<String>,
    pub params: Params,
    pub cache_key: Option<String>,
    pub locale: Option<String>,
    pub headers: HeaderMap,
}

/// Renders `kind:page:path` bodies and writes cache entries like the origin renderer.
pub struct MockRenderer {
    store: Arc<MemoryCacheStore>,
    clock: Arc<ManualClock>,
    calls: Mutex<Vec<RenderCall>>,
    failing: Mutex<Vec<String>>,
    response_headers: Mutex<HeaderMap>,
}

impl MockRenderer {
    pub fn new(store: Arc<MemoryCacheStore>, clock: Arc<ManualClock>) -> Self {
        Self {
            store,
            clock,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            response_headers: Mutex::new(HeaderMap::new()),
        }
    }

    /// Renders of `path` fail with an upstream error.
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().push(path.to_string());
    }

    /// Add a header to every rendered response.
    pub fn respond_with_header(&self, name: &str, value: &str) {
        self.response_headers.lock().unwrap().append_str(name, value);
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> RenderCall {
        self.calls().pop().expect("renderer was not called")
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(
        &self,
        req: &InternalRequest,
        route: &ResolvedRoute,
    ) -> Result<EdgeResponse, RenderError> {
        self.calls.lock().unwrap().push(RenderCall {
            path: req.path.clone(),
            query: req.query.to_query_string(),
            kind: route.kind,
            page_id: route.page_id.clone(),
            params: route.params.clone(),
            cache_key: route.cache_key.clone(),
            locale: req.locale.clone(),
            headers: req.headers.clone(),
        });
        if self.failing.lock().unwrap().contains(&req.path) {
            return Err(RenderError::Upstream("connection refused".into()));
        }

        let mut headers = self.response_headers.lock().unwrap().clone();
        headers.set_str("content-type", "text/html");
        let body = format!(
            "{}:{}:{}",
            route.kind.as_str(),
            route.page_id.as_deref().unwrap_or("-"),
            req.path
        );
        let response = EdgeResponse::new(StatusCode::OK, headers, body);

        if let Some(key) = &route.cache_key {
            if let Some(entry) = cache_entry_for(key, &response, self.clock.now_millis()) {
                self.store.put(entry).await.expect("memory store never fails");
            }
        }
        Ok(response)
    }
}

/// Records external rewrite targets.
#[derive(Default)]
pub struct RecordingProxy {
    targets: Mutex<Vec<String>>,
}

impl RecordingProxy {
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalProxy for RecordingProxy {
    async fn forward(&self, _req: &InternalRequest, target: &Url) -> Result<EdgeResponse, ProxyError> {
        self.targets.lock().unwrap().push(target.to_string());
        Ok(EdgeResponse::text(StatusCode::OK, "external"))
    }
}

/// Pipeline wired to in-memory collaborators and a manual clock.
pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<MemoryCacheStore>,
    pub clock: Arc<ManualClock>,
    pub renderer: Arc<MockRenderer>,
    pub proxy: Arc<RecordingProxy>,
    pub receivers: Vec<ShardReceiver>,
    pub config: RouterConfig,
}

impl Harness {
    pub fn new(raw: &str) -> Self {
        Self::with_middleware(raw, None)
    }

    pub fn with_middleware(raw: &str, middleware: Option<Arc<dyn Middleware>>) -> Self {
        let config = config(raw);
        let store = Arc::new(MemoryCacheStore::new());
        let clock = Arc::new(ManualClock::new(T));
        let renderer = Arc::new(MockRenderer::new(store.clone(), clock.clone()));
        let proxy = Arc::new(RecordingProxy::default());
        let shard_count = config.revalidation.shard_count;
        let (queue, receivers) = MemoryQueue::new(
            shard_count,
            std::time::Duration::from_secs(config.revalidation.dedupe_window_secs),
            clock.clone(),
        );

        let collaborators = Collaborators {
            renderer: renderer.clone(),
            store: store.clone(),
            queue: Arc::new(queue),
            shard_count,
            proxy: proxy.clone(),
            middleware,
            clock: clock.clone(),
        };
        let manifest = Manifest::compile(&config).expect("manifest compiles");
        let pipeline = Arc::new(Pipeline::new(manifest, collaborators).expect("pipeline builds"));

        Self {
            pipeline,
            store,
            clock,
            renderer,
            proxy,
            receivers,
            config,
        }
    }

    /// Route a request and wait for its background work.
    pub async fn send(&self, req: InternalRequest) -> EdgeResponse {
        let (response, scope) = self.pipeline.handle(req).await;
        scope.finish().await;
        response
    }

    pub async fn get(&self, url: &str) -> EdgeResponse {
        self.send(InternalRequest::new(Method::GET, url)).await
    }

    /// Store an entry as if it had been rendered at `last_modified`.
    pub async fn seed(&self, key: &str, kind: CacheKind, tags: &[&str], last_modified: u64) {
        let mut headers = HeaderMap::new();
        headers.set_str("content-type", "text/html");
        let entry = CacheEntry::new(
            key,
            CacheValue {
                kind,
                body: Bytes::from(format!("cached:{key}")),
                meta: CacheMeta {
                    status: StatusCode::OK,
                    headers,
                },
            },
            last_modified,
        )
        .with_tags(tags.iter().copied());
        self.store.put(entry).await.expect("memory store never fails");
    }

    /// Every job currently queued, across all shards.
    pub fn drain_jobs(&mut self) -> Vec<RevalidationJob> {
        let mut jobs = Vec::new();
        for rx in &mut self.receivers {
            while let Ok(job) = rx.try_recv() {
                jobs.push(job);
            }
        }
        jobs
    }
}

pub fn header<'a>(response: &'a EdgeResponse, name: &str) -> Option<&'a str> {
    response.headers.get_str(name)
}

/// Start a mock origin on an ephemeral port. Returns its address and a hit counter.
pub async fn start_mock_origin(
    status: u16,
    headers: &'static [(&'static str, &'static str)],
    body: &'static str,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;

                let mut response = format!("HTTP/1.1 {status} OK\r\n");
                for (name, value) in headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                let body = format!("{body}#{n}");
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, hits)
}

/// Start an origin that answers every request with its own request head as the body.
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let body = String::from_utf8_lossy(&request).to_ascii_lowercase();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
