//! Service descriptor

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
    pub endpoints: Vec<EndpointInfo>,
    pub examples: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Service health, cache size and agent availability"),
    ("GET", "/categories", "Registered trend categories"),
    ("GET", "/api/v1/{geo}?workers=N", "Harvest every category for a geography"),
    ("GET", "/api/v1/{geo}/{category}", "Harvest a single category"),
    ("DELETE", "/cache", "Clear cached harvests"),
    ("GET", "/events", "Harvest progress as Server-Sent Events"),
];

/// GET /
pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let mut examples = Vec::new();
    for geo in &state.config.geographies {
        examples.push(format!("/api/v1/{}", geo));
        examples.push(format!("/api/v1/{}/technology", geo));
    }

    Json(ServiceInfo {
        service: "trends-harvester".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        endpoints: ENDPOINTS
            .iter()
            .map(|&(method, path, description)| EndpointInfo {
                method,
                path,
                description,
            })
            .collect(),
        examples,
    })
}

pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(service_info))
}
