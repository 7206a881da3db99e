//! trends-harvester library interface
//!
//! Exposes the harvest pipeline (scheduler, claim detector, aggregator,
//! cache) and the HTTP router built on top of it.

pub mod api;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trends_common::config::HarvesterConfig;
use trends_common::events::EventBus;

use crate::services::{
    ArtifactClaimDetector, HarvestScheduler, HarvestService, ResponseCache, RetrievalAgent,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub harvester: Arc<HarvestService>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub config: Arc<HarvesterConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(harvester: Arc<HarvestService>, event_bus: EventBus, config: Arc<HarvesterConfig>) -> Self {
        Self {
            harvester,
            event_bus,
            config,
            startup_time: Utc::now(),
        }
    }

    /// Wire the full pipeline from configuration around `agent`
    ///
    /// Configs built in code are validated here as well as on load.
    pub fn from_config(config: HarvesterConfig, agent: Arc<dyn RetrievalAgent>) -> trends_common::Result<Self> {
        config.validate()?;
        let event_bus = EventBus::new(256);
        let bounds = config.worker_bounds()?;
        let retrieval = Arc::new(config.retrieval.clone());
        let detector = Arc::new(ArtifactClaimDetector::from_config(&retrieval));

        let scheduler = HarvestScheduler::new(agent, detector, retrieval).with_event_bus(event_bus.clone());
        let cache = Arc::new(ResponseCache::new(config.cache_ttl()));
        let harvester = HarvestService::new(scheduler, cache, bounds).with_event_bus(event_bus.clone());

        Ok(Self::new(Arc::new(harvester), event_bus, Arc::new(config)))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(api::root_routes())
        .merge(api::health_routes())
        .merge(api::category_routes())
        .merge(api::trend_routes())
        .merge(api::cache_routes())
        .route("/events", get(api::event_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
