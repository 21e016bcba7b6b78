use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::cache::entry::EntrySummary;
use crate::cache::store::StoreStats;
use crate::error::CacheError;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub shard_count: u32,
    pub workers_enabled: bool,
}

#[derive(Serialize)]
pub struct CacheReport {
    pub stats: StoreStats,
    pub entries: Vec<EntrySummary>,
}

#[derive(Serialize)]
pub struct TagRevalidated {
    pub tag: String,
    pub revalidated_at: u64,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    pub path: String,
}

#[derive(Serialize)]
pub struct Deleted {
    pub path: String,
    pub deleted: bool,
}

type AdminResult<T> = Result<Json<T>, (StatusCode, Json<serde_json::Value>)>;

fn unavailable(e: CacheError) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!(error = %e, "Admin cache operation failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        shard_count: state.shard_count,
        workers_enabled: state.workers_enabled,
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> AdminResult<CacheReport> {
    let stats = state.store.stats().await.map_err(unavailable)?;
    let entries = state.store.list().await.map_err(unavailable)?;
    Ok(Json(CacheReport { stats, entries }))
}

pub async fn revalidate_tag(
    State(state): State<AdminState>,
    Path(tag): Path<String>,
) -> AdminResult<TagRevalidated> {
    let at = state.clock.now_millis();
    state.store.revalidate_tag(&tag, at).await.map_err(unavailable)?;
    tracing::info!(tag = %tag, revalidated_at = at, "Tag revalidated");
    Ok(Json(TagRevalidated {
        tag,
        revalidated_at: at,
    }))
}

pub async fn delete_cache(
    State(state): State<AdminState>,
    Query(params): Query<DeleteParams>,
) -> AdminResult<Deleted> {
    let deleted = state.store.delete(&params.path).await.map_err(unavailable)?;
    tracing::info!(path = %params.path, deleted, "Cache entry deleted");
    Ok(Json(Deleted {
        path: params.path,
        deleted,
    }))
}
