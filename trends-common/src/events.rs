//! Harvest progress events
//!
//! The pipeline emits [`HarvestEvent`]s on an [`EventBus`]; the HTTP layer
//! forwards them to Server-Sent Events clients. Emission never blocks and
//! never fails the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Coarse result of one category retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Empty,
    Failed,
}

/// Harvest pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    /// Tasks dispatched for a harvest
    HarvestStarted {
        geo: String,
        categories: usize,
        workers: usize,
        timestamp: DateTime<Utc>,
    },

    /// One category resolved
    CategoryCompleted {
        geo: String,
        category: String,
        outcome: OutcomeKind,
        rows: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// All tasks of a harvest resolved
    HarvestCompleted {
        geo: String,
        success: usize,
        empty: usize,
        failed: usize,
        total_rows: usize,
        duration_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// Response cache was cleared by an operator
    CacheCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl HarvestEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            HarvestEvent::HarvestStarted { .. } => "HarvestStarted",
            HarvestEvent::CategoryCompleted { .. } => "CategoryCompleted",
            HarvestEvent::HarvestCompleted { .. } => "HarvestCompleted",
            HarvestEvent::CacheCleared { .. } => "CacheCleared",
        }
    }
}

/// Broadcast channel for harvest events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HarvestEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; returns the number of subscribers reached
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: HarvestEvent,
    ) -> Result<usize, broadcast::error::SendError<HarvestEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
