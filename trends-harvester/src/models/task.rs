//! Retrieval tasks and their results

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use trends_common::events::OutcomeKind;
use trends_common::Category;

use super::dataset::RawTrend;

/// One category fetch for one geography
///
/// Created by the scheduler per dispatch and consumed exactly once.
#[derive(Debug, Clone)]
pub struct RetrievalTask {
    pub category: Category,
    pub geo: String,
    pub url: String,
    pub submitted_at: DateTime<Utc>,
}

impl RetrievalTask {
    pub fn new(category: Category, geo: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            category,
            geo: geo.into(),
            url: url.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// How a retrieval task resolved
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// Artifact claimed and at least one row read
    Success {
        rows: Vec<RawTrend>,
        /// Claimed artifact, if it was kept on disk
        artifact: Option<PathBuf>,
    },
    /// No artifact within the wait window, or an artifact without data rows
    Empty,
    /// Agent error, lost claim race or unreadable artifact
    Failed(String),
}

impl RetrievalOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RetrievalOutcome::Success { .. } => OutcomeKind::Success,
            RetrievalOutcome::Empty => OutcomeKind::Empty,
            RetrievalOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            RetrievalOutcome::Success { rows, .. } => rows.len(),
            _ => 0,
        }
    }
}

/// Result of one task, produced once by the worker that ran it
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub task: RetrievalTask,
    pub outcome: RetrievalOutcome,
    pub finished_at: DateTime<Utc>,
}

impl RetrievalResult {
    pub fn new(task: RetrievalTask, outcome: RetrievalOutcome) -> Self {
        Self {
            task,
            outcome,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(task: RetrievalTask, reason: impl Into<String>) -> Self {
        Self::new(task, RetrievalOutcome::Failed(reason.into()))
    }
}
