//! Data models for the harvest pipeline

pub mod dataset;
pub mod report;
pub mod task;

pub use dataset::{master_header, MasterDataset, RawTrend, TrendRow, ARTIFACT_HEADER, CATEGORY_COLUMN};
pub use report::{CategoryInfo, CategoryReport, CategorySelector, HarvestReport, HarvestResponse};
pub use task::{RetrievalOutcome, RetrievalResult, RetrievalTask};
