//! Admin API: cache inspection and on-demand invalidation.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::cache::store::CacheStore;
use crate::clock::Clock;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub api_key: Arc<str>,
    pub shard_count: u32,
    pub workers_enabled: bool,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache).delete(delete_cache))
        .route("/admin/revalidate/tag/{tag}", post(revalidate_tag))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
