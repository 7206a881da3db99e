//! Harvest pipeline services

pub mod agent;
pub mod aggregator;
pub mod cache;
pub mod claim;
pub mod harvest;
pub mod scheduler;

pub use agent::{AgentError, CommandAgent, RetrievalAgent};
pub use aggregator::{
    collect_tagged_artifacts, merge_artifacts, read_artifact, tag_artifact, write_csv, AggregateError, Aggregator,
};
pub use cache::{CacheKey, ResponseCache};
pub use claim::{claim_tag, claimed_file_name, ArtifactClaimDetector, ArtifactFilter, ClaimError, Snapshot};
pub use harvest::{normalize_geo, HarvestError, HarvestService};
pub use scheduler::HarvestScheduler;
