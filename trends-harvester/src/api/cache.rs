//! Cache administration

use axum::{extract::State, routing::delete, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub message: String,
    pub removed: usize,
}

/// DELETE /cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheClearResponse> {
    let removed = state.harvester.clear_cache();
    info!(removed, "Cache cleared via API");

    Json(CacheClearResponse {
        message: format!("Cache cleared, {} entries removed", removed),
        removed,
    })
}

pub fn cache_routes() -> Router<AppState> {
    Router::new().route("/cache", delete(clear_cache))
}
