//! Harvest service
//!
//! Entry point used by the HTTP layer: validates the request, answers from
//! the response cache when possible, and otherwise runs the scheduler and
//! caches the result. The cache lock is never held while harvesting.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use trends_common::config::WorkerBounds;
use trends_common::events::{EventBus, HarvestEvent};
use trends_common::CategoryRegistry;

use super::cache::{CacheKey, ResponseCache};
use super::scheduler::HarvestScheduler;
use crate::models::{CategorySelector, HarvestResponse};

/// Request-level harvest errors
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Selector names no registered category; nothing was dispatched
    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    /// Single-category harvest produced no rows
    #[error("no data found for category '{category}' in {geo}")]
    NoData { category: String, geo: String },

    #[error("invalid geography '{0}'")]
    InvalidGeography(String),
}

/// Upper-case and check a geography code
pub fn normalize_geo(raw: &str) -> Result<String, HarvestError> {
    let geo = raw.trim().to_uppercase();
    if geo.is_empty() || !geo.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(HarvestError::InvalidGeography(raw.to_string()));
    }
    Ok(geo)
}

/// Cached front of the harvest pipeline
pub struct HarvestService {
    scheduler: HarvestScheduler,
    cache: Arc<ResponseCache<HarvestResponse>>,
    bounds: WorkerBounds,
    registry: &'static CategoryRegistry,
    event_bus: Option<EventBus>,
}

impl HarvestService {
    pub fn new(
        scheduler: HarvestScheduler,
        cache: Arc<ResponseCache<HarvestResponse>>,
        bounds: WorkerBounds,
    ) -> Self {
        Self {
            scheduler,
            cache,
            bounds,
            registry: CategoryRegistry::global(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Harvest `selector` (`"all"` or a slug) for `geo`
    ///
    /// `workers` is clamped into the configured bounds; `None` selects the
    /// configured default. Single-category requests that yield no rows fail
    /// with [`HarvestError::NoData`] and are not cached.
    pub async fn harvest(
        &self,
        geo: &str,
        selector: &str,
        workers: Option<usize>,
    ) -> Result<HarvestResponse, HarvestError> {
        let geo = normalize_geo(geo)?;
        let selector = CategorySelector::parse(selector, self.registry)
            .map_err(|_| HarvestError::UnknownCategory(selector.trim().to_lowercase()))?;
        let key = CacheKey::new(&geo, selector.as_str());

        if let Some(mut cached) = self.cache.get(&key) {
            info!(key = %key, "Serving cached harvest");
            cached.cached = true;
            return Ok(cached);
        }

        let workers = self.bounds.clamp(workers);
        let categories = selector.categories(self.registry);
        let report = self.scheduler.run_harvest(&geo, &categories, workers).await;
        let response = HarvestResponse::from_report(report, &selector);

        if let CategorySelector::One(category) = &selector {
            if response.total_rows == 0 {
                return Err(HarvestError::NoData {
                    category: category.slug.to_string(),
                    geo,
                });
            }
        }

        self.cache.put(key, response.clone());
        Ok(response)
    }

    /// Drop every cached response; returns how many were removed
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(HarvestEvent::CacheCleared {
                removed,
                timestamp: chrono::Utc::now(),
            });
        }
        removed
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn agent_available(&self) -> bool {
        self.scheduler.agent().is_available()
    }

    pub fn agent_name(&self) -> &str {
        self.scheduler.agent().name()
    }

    pub fn worker_bounds(&self) -> WorkerBounds {
        self.bounds
    }

    pub fn registry(&self) -> &'static CategoryRegistry {
        self.registry
    }
}
