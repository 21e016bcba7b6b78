//! edge-router: request routing and incremental-cache edge layer.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ pipeline::orchestrator
//!                                   │  normalize, redirects, middleware,
//!                                   │  rewrites, route match, fallback
//!                                   ▼
//!                             cache::interceptor ──HIT/STALE──▶ Client
//!                                   │ MISS            │ STALE
//!                                   ▼                 ▼
//!                          upstream::renderer   revalidation queue
//!                          (origin, cache write)      │
//!                                   ▲                 ▼
//!                                   └──── revalidation workers
//! ```

use std::path::PathBuf;

use clap::Parser;

use edge_router::config::{load_config, RouterConfig};
use edge_router::lifecycle;
use edge_router::observability::init_tracing;

#[derive(Parser)]
#[command(name = "edge-router")]
#[command(about = "Edge request router with incremental cache", long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_tracing(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        shard_count = config.revalidation.shard_count,
        "edge-router starting"
    );

    lifecycle::run(config).await?;
    Ok(())
}
