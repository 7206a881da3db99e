//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when the retrieval agent cannot run
    pub status: String,
    pub module: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    /// Stored cache entries (expired ones count until evicted)
    pub cache_size: usize,
    pub agent: AgentHealth,
}

#[derive(Debug, Serialize)]
pub struct AgentHealth {
    pub name: String,
    pub available: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let uptime_seconds = now.signed_duration_since(state.startup_time).num_seconds().max(0) as u64;
    let available = state.harvester.agent_available();

    Json(HealthResponse {
        status: if available { "healthy" } else { "degraded" }.to_string(),
        module: "trends-harvester".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime_seconds,
        cache_size: state.harvester.cache_len(),
        agent: AgentHealth {
            name: state.harvester.agent_name().to_string(),
            available,
        },
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
