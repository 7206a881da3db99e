//! Harvest reports and client-facing responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use trends_common::events::OutcomeKind;
use trends_common::{Category, CategoryRegistry, ALL_SELECTOR};

use super::dataset::{MasterDataset, TrendRow};

/// Which categories a harvest covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySelector {
    All,
    One(Category),
}

impl CategorySelector {
    /// Parse `"all"` or a category slug (case-insensitive)
    pub fn parse(raw: &str, registry: &CategoryRegistry) -> trends_common::Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized == ALL_SELECTOR {
            return Ok(CategorySelector::All);
        }
        registry
            .by_slug(&normalized)
            .map(|c| CategorySelector::One(c.clone()))
    }

    /// Categories to dispatch, in registry order
    pub fn categories(&self, registry: &CategoryRegistry) -> Vec<Category> {
        match self {
            CategorySelector::All => registry.all().to_vec(),
            CategorySelector::One(category) => vec![category.clone()],
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CategorySelector::All => ALL_SELECTOR,
            CategorySelector::One(category) => category.slug,
        }
    }
}

/// Per-category line of a harvest report
#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub outcome: OutcomeKind,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Everything a scheduler run produced
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub geo: String,
    pub dataset: MasterDataset,
    /// One entry per dispatched category, in completion order
    pub categories: Vec<CategoryReport>,
    pub success_count: usize,
    pub empty_count: usize,
    pub failed_count: usize,
    pub duration: Duration,
}

impl HarvestReport {
    pub fn total_rows(&self) -> usize {
        self.dataset.len()
    }

    pub fn total_categories(&self) -> usize {
        self.categories.len()
    }

    /// Artifacts kept on disk by successful categories
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.categories
            .iter()
            .filter_map(|c| c.artifact.clone())
            .collect()
    }
}

/// Response payload of `harvest`, also the cached value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestResponse {
    pub geo: String,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryInfo>,
    pub total_categories: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub empty_count: usize,
    pub total_rows: usize,
    pub rows: Vec<TrendRow>,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    pub cached: bool,
}

/// Category details echoed back for single-category requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: u32,
    pub name: String,
    pub slug: String,
}

impl From<&Category> for CategoryInfo {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.to_string(),
            slug: category.slug.to_string(),
        }
    }
}

impl HarvestResponse {
    pub fn from_report(report: HarvestReport, selector: &CategorySelector) -> Self {
        let category = match selector {
            CategorySelector::One(c) => Some(CategoryInfo::from(c)),
            CategorySelector::All => None,
        };
        let total_rows = report.total_rows();
        let duration_seconds = (report.duration.as_secs_f64() * 100.0).round() / 100.0;

        Self {
            geo: report.geo,
            selector: selector.as_str().to_string(),
            category,
            total_categories: report.categories.len(),
            success_count: report.success_count,
            failed_count: report.failed_count,
            empty_count: report.empty_count,
            total_rows,
            rows: report.dataset.rows,
            timestamp: Utc::now(),
            duration_seconds,
            cached: false,
        }
    }
}
