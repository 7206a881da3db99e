//! Category listing

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::models::CategoryInfo;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CategoryList {
    pub total: usize,
    pub categories: Vec<CategoryInfo>,
}

/// GET /categories
pub async fn list_categories(State(state): State<AppState>) -> Json<CategoryList> {
    let categories: Vec<CategoryInfo> = state
        .harvester
        .registry()
        .all()
        .iter()
        .map(CategoryInfo::from)
        .collect();

    Json(CategoryList {
        total: categories.len(),
        categories,
    })
}

pub fn category_routes() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories))
}
