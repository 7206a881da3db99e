//! Harvest scheduler and worker pool
//!
//! **Parallel mode** ([`HarvestScheduler::run_harvest`]):
//! - One [`RetrievalTask`] per category is fed into a bounded task channel
//! - A fixed number of worker routines pull tasks until the channel closes
//! - Every worker sends exactly one [`RetrievalResult`] per task into the
//!   result channel; the caller drains it and aggregates as results arrive
//!
//! A task failure (agent error, timeout, lost claim, panic) is converted into
//! a result for that task only; the other workers keep going.
//!
//! **Sequential mode** ([`HarvestScheduler::run_sequential`]): one category at
//! a time with a pause in between, artifacts kept on disk and tagged with
//! their category for a later merge.

use futures::FutureExt;
use rand::Rng;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use trends_common::config::RetrievalConfig;
use trends_common::events::{EventBus, HarvestEvent, OutcomeKind};
use trends_common::Category;
use uuid::Uuid;

use super::agent::RetrievalAgent;
use super::aggregator::{read_artifact, tag_artifact, Aggregator};
use super::claim::{ArtifactClaimDetector, ClaimError};
use crate::models::{CategoryReport, HarvestReport, RetrievalOutcome, RetrievalResult, RetrievalTask};

/// Runs retrieval tasks and folds their results into a [`HarvestReport`]
#[derive(Clone)]
pub struct HarvestScheduler {
    agent: Arc<dyn RetrievalAgent>,
    detector: Arc<ArtifactClaimDetector>,
    config: Arc<RetrievalConfig>,
    event_bus: Option<EventBus>,
}

impl HarvestScheduler {
    pub fn new(
        agent: Arc<dyn RetrievalAgent>,
        detector: Arc<ArtifactClaimDetector>,
        config: Arc<RetrievalConfig>,
    ) -> Self {
        Self {
            agent,
            detector,
            config,
            event_bus: None,
        }
    }

    /// Publish progress events on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn agent(&self) -> &Arc<dyn RetrievalAgent> {
        &self.agent
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Harvest `categories` for `geo` with up to `workers` concurrent tasks
    ///
    /// `workers` is expected to be clamped by the caller; it is only raised to
    /// at least one and capped at the number of categories here.
    pub async fn run_harvest(&self, geo: &str, categories: &[Category], workers: usize) -> HarvestReport {
        let started = Instant::now();
        let workers = workers.max(1).min(categories.len().max(1));

        info!(geo = %geo, categories = categories.len(), workers, "Harvest started");
        self.emit(HarvestEvent::HarvestStarted {
            geo: geo.to_string(),
            categories: categories.len(),
            workers,
            timestamp: chrono::Utc::now(),
        });

        let tasks: Vec<RetrievalTask> = categories
            .iter()
            .map(|c| RetrievalTask::new(c.clone(), geo, self.config.category_url(geo, c.id)))
            .collect();

        let (task_tx, task_rx) = mpsc::channel::<RetrievalTask>(workers);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<RetrievalResult>(categories.len().max(1));

        let mut pool = JoinSet::new();

        pool.spawn(async move {
            for task in tasks {
                if task_tx.send(task).await.is_err() {
                    break;
                }
            }
        });

        for worker in 0..workers {
            let scheduler = self.clone();
            let tasks = Arc::clone(&task_rx);
            let results = result_tx.clone();
            pool.spawn(async move { scheduler.worker_loop(worker, tasks, results).await });
        }
        drop(result_tx);

        let aggregator = Aggregator::new();
        let mut tally = Tally::default();
        let mut seen = HashSet::new();

        while let Some(result) = result_rx.recv().await {
            if !seen.insert(result.task.category.id) {
                warn!(geo = %geo, category = result.task.category.name, "Duplicate result ignored");
                continue;
            }
            let added = aggregator.append(&result);
            self.record(geo, &result, added, &mut tally);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(geo = %geo, error = %e, "Harvest worker terminated abnormally");
            }
        }

        for category in categories.iter().filter(|c| !seen.contains(&c.id)) {
            warn!(geo = %geo, category = category.name, "No result reported for category");
            let task = RetrievalTask::new(category.clone(), geo, self.config.category_url(geo, category.id));
            self.record(geo, &RetrievalResult::failed(task, "no result reported"), 0, &mut tally);
        }

        self.finish(geo, aggregator, tally, started.elapsed())
    }

    /// Harvest one category at a time, tagging every kept artifact
    ///
    /// Artifacts are always retained in the download directory so they can be
    /// merged afterwards.
    pub async fn run_sequential(&self, geo: &str, categories: &[Category]) -> HarvestReport {
        let started = Instant::now();
        info!(geo = %geo, categories = categories.len(), "Sequential harvest started");
        self.emit(HarvestEvent::HarvestStarted {
            geo: geo.to_string(),
            categories: categories.len(),
            workers: 1,
            timestamp: chrono::Utc::now(),
        });

        let aggregator = Aggregator::new();
        let mut tally = Tally::default();

        for (index, category) in categories.iter().enumerate() {
            if index > 0 && !self.config.inter_task_delay().is_zero() {
                tokio::time::sleep(self.config.inter_task_delay()).await;
            }

            let task = RetrievalTask::new(category.clone(), geo, self.config.category_url(geo, category.id));
            let result = self.run_guarded(task, true).await;

            if let RetrievalOutcome::Success {
                artifact: Some(path), ..
            } = &result.outcome
            {
                let path = path.clone();
                let category = category.clone();
                match tokio::task::spawn_blocking(move || tag_artifact(&path, &category)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(geo = %geo, error = %e, "Artifact tagging failed"),
                    Err(e) => warn!(geo = %geo, error = %e, "Artifact tagging task failed"),
                }
            }

            let added = aggregator.append(&result);
            self.record(geo, &result, added, &mut tally);
        }

        self.finish(geo, aggregator, tally, started.elapsed())
    }

    /// Run one task to completion, sleeping its jitter first
    pub async fn execute(&self, task: RetrievalTask, retain: bool) -> RetrievalResult {
        let jitter = self.jitter();
        if !jitter.is_zero() {
            debug!(category = task.category.name, jitter_ms = jitter.as_millis() as u64, "Task jitter");
            tokio::time::sleep(jitter).await;
        }

        let outcome = self.retrieve(&task, retain).await;
        match &outcome {
            RetrievalOutcome::Success { rows, .. } => {
                info!(geo = %task.geo, category = task.category.name, rows = rows.len(), "Category harvested")
            }
            RetrievalOutcome::Empty => {
                info!(geo = %task.geo, category = task.category.name, "Category returned no data")
            }
            RetrievalOutcome::Failed(reason) => {
                warn!(geo = %task.geo, category = task.category.name, reason = %reason, "Category failed")
            }
        }
        RetrievalResult::new(task, outcome)
    }

    async fn worker_loop(
        &self,
        worker: usize,
        tasks: Arc<Mutex<mpsc::Receiver<RetrievalTask>>>,
        results: mpsc::Sender<RetrievalResult>,
    ) {
        debug!(worker, "Worker started");
        loop {
            let next = tasks.lock().await.recv().await;
            let Some(task) = next else { break };

            debug!(worker, category = task.category.name, "Worker picked task");
            let result = self.run_guarded(task, self.config.retain_artifacts).await;
            if results.send(result).await.is_err() {
                break;
            }
        }
        debug!(worker, "Worker finished");
    }

    /// [`execute`](Self::execute) with a panic converted into a failed result
    async fn run_guarded(&self, task: RetrievalTask, retain: bool) -> RetrievalResult {
        let fallback = task.clone();
        match AssertUnwindSafe(self.execute(task, retain)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(category = fallback.category.name, "Retrieval task panicked");
                RetrievalResult::failed(fallback, "task panicked")
            }
        }
    }

    async fn retrieve(&self, task: &RetrievalTask, retain: bool) -> RetrievalOutcome {
        let download_dir = self.config.download_dir.clone();
        let watch_dir = if self.config.isolate_task_dirs {
            let unique = Uuid::new_v4().simple().to_string();
            download_dir.join(format!(".scratch_{}_{}", task.category.id, &unique[..8]))
        } else {
            download_dir.clone()
        };

        let outcome = self.retrieve_in(task, &watch_dir, &download_dir, retain).await;

        if self.config.isolate_task_dirs {
            if let Err(e) = tokio::fs::remove_dir_all(&watch_dir).await {
                debug!(dir = %watch_dir.display(), error = %e, "Scratch directory cleanup failed");
            }
        }
        outcome
    }

    async fn retrieve_in(
        &self,
        task: &RetrievalTask,
        watch_dir: &Path,
        download_dir: &Path,
        retain: bool,
    ) -> RetrievalOutcome {
        let snapshot = match self.detector.snapshot(watch_dir).await {
            Ok(snapshot) => snapshot,
            Err(e) => return RetrievalOutcome::Failed(e.to_string()),
        };

        if let Err(e) = self
            .agent
            .fetch(&task.url, watch_dir, self.config.agent_timeout())
            .await
        {
            return RetrievalOutcome::Failed(format!("agent failure: {}", e));
        }

        let claimed = match self
            .detector
            .await_and_claim(
                watch_dir,
                &snapshot,
                download_dir,
                &task.category,
                self.config.artifact_timeout(),
            )
            .await
        {
            Ok(path) => path,
            Err(ClaimError::Timeout { .. }) => return RetrievalOutcome::Empty,
            Err(ClaimError::Vanished(_)) => return RetrievalOutcome::Failed("artifact vanished".to_string()),
            Err(e) => return RetrievalOutcome::Failed(e.to_string()),
        };

        let path = claimed.clone();
        let rows = match tokio::task::spawn_blocking(move || read_artifact(&path)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return RetrievalOutcome::Failed(e.to_string()),
            Err(e) => return RetrievalOutcome::Failed(format!("artifact reader failed: {}", e)),
        };

        let artifact = if retain {
            Some(claimed)
        } else {
            discard(&claimed).await;
            None
        };

        if rows.is_empty() {
            RetrievalOutcome::Empty
        } else {
            RetrievalOutcome::Success { rows, artifact }
        }
    }

    fn jitter(&self) -> Duration {
        let (min, max) = (self.config.jitter_min_ms, self.config.jitter_max_ms);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn record(&self, geo: &str, result: &RetrievalResult, added: usize, tally: &mut Tally) {
        let kind = result.outcome.kind();
        let reason = match &result.outcome {
            RetrievalOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        let artifact = match &result.outcome {
            RetrievalOutcome::Success { artifact, .. } => artifact.clone(),
            _ => None,
        };

        match kind {
            OutcomeKind::Success => tally.success += 1,
            OutcomeKind::Empty => tally.empty += 1,
            OutcomeKind::Failed => tally.failed += 1,
        }

        self.emit(HarvestEvent::CategoryCompleted {
            geo: geo.to_string(),
            category: result.task.category.name.to_string(),
            outcome: kind,
            rows: added,
            reason: reason.clone(),
            timestamp: chrono::Utc::now(),
        });

        tally.reports.push(CategoryReport {
            category: result.task.category.clone(),
            outcome: kind,
            rows: added,
            reason,
            artifact,
        });
    }

    fn finish(&self, geo: &str, aggregator: Aggregator, tally: Tally, duration: Duration) -> HarvestReport {
        let dataset = aggregator.into_dataset();

        info!(
            geo = %geo,
            success = tally.success,
            empty = tally.empty,
            failed = tally.failed,
            total_rows = dataset.len(),
            duration_ms = duration.as_millis() as u64,
            "Harvest completed"
        );
        self.emit(HarvestEvent::HarvestCompleted {
            geo: geo.to_string(),
            success: tally.success,
            empty: tally.empty,
            failed: tally.failed,
            total_rows: dataset.len(),
            duration_seconds: duration.as_secs_f64(),
            timestamp: chrono::Utc::now(),
        });

        HarvestReport {
            geo: geo.to_string(),
            dataset,
            categories: tally.reports,
            success_count: tally.success,
            empty_count: tally.empty,
            failed_count: tally.failed,
            duration,
        }
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}

#[derive(Default)]
struct Tally {
    success: usize,
    empty: usize,
    failed: usize,
    reports: Vec<CategoryReport>,
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(file = %path.display(), error = %e, "Artifact removal failed");
    }
}
