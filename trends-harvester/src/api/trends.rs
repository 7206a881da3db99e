//! Harvest endpoints
//!
//! - `GET /api/v1/:geo?workers=N` harvests every category
//! - `GET /api/v1/:geo/:category` harvests one category by slug

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use trends_common::ALL_SELECTOR;

use crate::error::ApiResult;
use crate::models::HarvestResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HarvestQuery {
    /// Requested worker count, clamped into the configured bounds
    pub workers: Option<usize>,
}

/// GET /api/v1/:geo
pub async fn harvest_all(
    State(state): State<AppState>,
    Path(geo): Path<String>,
    Query(query): Query<HarvestQuery>,
) -> ApiResult<Json<HarvestResponse>> {
    info!(geo = %geo, workers = ?query.workers, "Harvest requested for all categories");
    let response = state.harvester.harvest(&geo, ALL_SELECTOR, query.workers).await?;
    Ok(Json(response))
}

/// GET /api/v1/:geo/:category
pub async fn harvest_category(
    State(state): State<AppState>,
    Path((geo, category)): Path<(String, String)>,
) -> ApiResult<Json<HarvestResponse>> {
    info!(geo = %geo, category = %category, "Harvest requested for one category");
    let response = state.harvester.harvest(&geo, &category, None).await?;
    Ok(Json(response))
}

pub fn trend_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/:geo", get(harvest_all))
        .route("/api/v1/:geo/:category", get(harvest_category))
}
