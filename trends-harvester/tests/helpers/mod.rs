//! Shared test fixtures: a scripted retrieval agent and fast test configs

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trends_common::config::HarvesterConfig;
use trends_harvester::services::{AgentError, RetrievalAgent};
use trends_harvester::AppState;
use url::Url;

pub const ARTIFACT_HEADER_LINE: &str = "Trends,Search volume,Started,Ended,Trend breakdown,Explore link";

/// What the scripted agent does for a category
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Deposit an artifact with `n` data rows
    Rows(usize),
    /// Report success but deposit nothing
    NoArtifact,
    /// Report an agent failure
    Fail,
    /// Deposit an artifact with only the header
    HeaderOnly,
}

/// Fake agent driven by the `category=` parameter of the task URL
pub struct ScriptedAgent {
    default: Behavior,
    overrides: HashMap<u32, Behavior>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, category_id: u32, behavior: Behavior) -> Self {
        self.overrides.insert(category_id, behavior);
        self
    }

    /// Number of fetches performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, category_id: u32) -> Behavior {
        self.overrides.get(&category_id).copied().unwrap_or(self.default)
    }
}

pub fn category_from_url(url: &str) -> u32 {
    Url::parse(url)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "category").map(|(_, v)| v.into_owned()))
        .and_then(|id| id.parse().ok())
        .unwrap_or(0)
}

pub fn artifact_body(label: &str, rows: usize) -> String {
    let mut body = format!("{}\n", ARTIFACT_HEADER_LINE);
    for n in 0..rows {
        body.push_str(&format!(
            "{} trend {},{}K+,2 hours ago,,\"{} a, {} b\",https://example.test/{}/{}\n",
            label, n, n + 1, label, label, label, n
        ));
    }
    body
}

#[async_trait]
impl RetrievalAgent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, url: &str, working_dir: &Path, _timeout: Duration) -> Result<(), AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = category_from_url(url);

        let rows = match self.behavior_for(id) {
            Behavior::Rows(n) => n,
            Behavior::HeaderOnly => 0,
            Behavior::NoArtifact => return Ok(()),
            Behavior::Fail => return Err(AgentError::Other(format!("scripted failure for category {}", id))),
        };

        let path = working_dir.join(format!("trending_cat{}.csv", id));
        tokio::fs::write(&path, artifact_body(&format!("c{}", id), rows))
            .await
            .map_err(|e| AgentError::Other(e.to_string()))
    }
}

/// Defaults with every delay shortened for tests
pub fn test_config(download_dir: &Path) -> HarvesterConfig {
    let mut config = HarvesterConfig::default();
    config.retrieval.download_dir = download_dir.to_path_buf();
    config.retrieval.artifact_timeout_secs = 1;
    config.retrieval.poll_interval_ms = 10;
    config.retrieval.settle_delay_ms = 0;
    config.retrieval.jitter_min_ms = 0;
    config.retrieval.jitter_max_ms = 0;
    config.retrieval.inter_task_delay_ms = 0;
    config
}

pub fn test_state(agent: Arc<ScriptedAgent>, download_dir: &Path) -> AppState {
    AppState::from_config(test_config(download_dir), agent).unwrap()
}
