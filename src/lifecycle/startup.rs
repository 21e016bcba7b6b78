//! Startup orchestration.
//!
//! # Responsibilities
//! - Compile the validated configuration into the pipeline
//! - Build the cache store, revalidation queue and workers
//! - Start the metrics exporter, admin API and public listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::admin::{setup_admin_router, AdminState};
use crate::cache::store::{CacheStore, MemoryCacheStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, RouterConfig};
use crate::error::ProxyError;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::shutdown_on_signal;
use crate::middleware::executor::Middleware;
use crate::observability::init_metrics;
use crate::pipeline::{Collaborators, Manifest, Pipeline};
use crate::revalidation::queue::MemoryQueue;
use crate::revalidation::worker::RevalidationWorker;
use crate::upstream::{HttpExternalProxy, HttpMiddleware, OriginRenderer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address `{0}`")]
    Address(String),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Everything the listeners need, built from config.
pub struct Services {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub workers: Vec<JoinHandle<()>>,
}

/// Build the pipeline and its collaborators, spawning revalidation workers.
pub fn build_services(config: &RouterConfig, shutdown: &Shutdown) -> Result<Services, StartupError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::with_max_entries(config.cache.max_entries));
    let upstream_timeout = Duration::from_secs(config.timeouts.upstream_secs);

    let revalidation = &config.revalidation;
    let (queue, receivers) = MemoryQueue::new(
        revalidation.shard_count,
        Duration::from_secs(revalidation.dedupe_window_secs),
        clock.clone(),
    );

    let middleware = config.middleware.endpoint.as_ref().map(|endpoint| {
        Arc::new(HttpMiddleware::new(endpoint.clone(), upstream_timeout)) as Arc<dyn Middleware>
    });

    let collaborators = Collaborators {
        renderer: Arc::new(OriginRenderer::new(
            config.origin.url.clone(),
            upstream_timeout,
            store.clone(),
            clock.clone(),
        )),
        store: store.clone(),
        queue: Arc::new(queue),
        shard_count: revalidation.shard_count,
        proxy: Arc::new(HttpExternalProxy::new(upstream_timeout)?),
        middleware,
        clock: clock.clone(),
    };

    let manifest = Manifest::compile(config)?;
    info!(
        routes = manifest.routes.routes().len(),
        i18n = manifest.i18n_enabled(),
        base_path = %manifest.base_path,
        "Manifest compiled"
    );
    let pipeline = Arc::new(Pipeline::new(manifest, collaborators)?);

    let workers = if revalidation.workers_enabled {
        RevalidationWorker::new(pipeline.clone()).spawn(receivers, shutdown)
    } else {
        warn!("Revalidation workers disabled, stale entries will not be regenerated");
        Vec::new()
    };

    Ok(Services {
        pipeline,
        store,
        clock,
        workers,
    })
}

fn parse_addr(raw: &str) -> Result<SocketAddr, StartupError> {
    raw.parse().map_err(|_| StartupError::Address(raw.to_string()))
}

/// Run the edge router until a termination signal arrives.
pub async fn run(config: RouterConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        init_metrics(parse_addr(&config.observability.metrics_address)?)?;
    }

    let shutdown = Shutdown::new();
    let services = build_services(&config, &shutdown)?;
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let admin = if config.admin.enabled {
        let state = AdminState {
            store: services.store.clone(),
            clock: services.clock.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
            shard_count: config.revalidation.shard_count,
            workers_enabled: config.revalidation.workers_enabled,
        };
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        info!(address = %listener.local_addr()?, "Admin API listening");
        let signalled = shutdown.signalled();
        Some(tokio::spawn(async move {
            axum::serve(listener, setup_admin_router(state))
                .with_graceful_shutdown(signalled)
                .await
        }))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let served = HttpServer::new(services.pipeline.clone(), &config)
        .run(listener, shutdown.clone())
        .await;

    // The public server may also stop on error; take everything else down with it.
    shutdown.trigger();
    if let Some(admin) = admin {
        if let Ok(Err(e)) = admin.await {
            warn!(error = %e, "Admin API stopped with error");
        }
    }
    for worker in services.workers {
        let _ = worker.await;
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}
