//! End-to-end harvest pipeline tests driven by a scripted retrieval agent

mod helpers;

use helpers::{test_config, test_state, Behavior, ScriptedAgent};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use trends_common::events::HarvestEvent;
use trends_common::CategoryRegistry;
use trends_harvester::models::HarvestResponse;
use trends_harvester::AppState;
use trends_harvester::services::{
    collect_tagged_artifacts, merge_artifacts, ArtifactClaimDetector, HarvestError, HarvestScheduler,
};

#[tokio::test]
async fn test_all_categories_with_one_empty_and_one_failed() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(
        ScriptedAgent::new(Behavior::Rows(2))
            .with(18, Behavior::Rows(5))
            .with(5, Behavior::NoArtifact)
            .with(7, Behavior::Fail),
    );
    let state = test_state(agent.clone(), dir.path());

    let response = state.harvester.harvest("IN", "all", Some(3)).await.unwrap();

    assert_eq!(response.total_categories, 20);
    assert_eq!(response.success_count, 18);
    assert_eq!(response.empty_count, 1);
    assert_eq!(response.failed_count, 1);
    assert_eq!(response.total_rows, 17 * 2 + 5);
    assert_eq!(response.rows.len(), response.total_rows);
    assert!(!response.cached);
    assert_eq!(agent.calls(), 20);

    let represented: HashSet<u32> = response.rows.iter().map(|r| r.category_id).collect();
    assert_eq!(represented.len(), 18);
    assert!(!represented.contains(&5));
    assert!(!represented.contains(&7));
    assert_eq!(response.rows.iter().filter(|r| r.category_id == 18).count(), 5);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(1)));
    let state = test_state(agent.clone(), dir.path());

    let first = state.harvester.harvest("IN", "all", None).await.unwrap();
    assert_eq!(agent.calls(), 20);

    let second = state.harvester.harvest("in", "ALL", None).await.unwrap();
    assert_eq!(agent.calls(), 20, "cached request must not dispatch tasks");
    assert_eq!(
        second,
        HarvestResponse {
            cached: true,
            ..first.clone()
        }
    );
}

#[tokio::test]
async fn test_clear_cache_forces_new_harvest() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(1)));
    let state = test_state(agent.clone(), dir.path());

    state.harvester.harvest("US", "all", Some(5)).await.unwrap();
    assert_eq!(state.harvester.cache_len(), 1);
    assert_eq!(state.harvester.clear_cache(), 1);
    assert_eq!(state.harvester.cache_len(), 0);

    let again = state.harvester.harvest("US", "all", Some(5)).await.unwrap();
    assert!(!again.cached);
    assert_eq!(agent.calls(), 40);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_startup() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(1)));

    let mut spinning = test_config(dir.path());
    spinning.retrieval.poll_interval_ms = 0;
    assert!(matches!(
        AppState::from_config(spinning, agent.clone()),
        Err(trends_common::Error::Config(_))
    ));

    let mut inverted = test_config(dir.path());
    inverted.retrieval.jitter_min_ms = 50;
    inverted.retrieval.jitter_max_ms = 10;
    assert!(matches!(
        AppState::from_config(inverted, agent.clone()),
        Err(trends_common::Error::Config(_))
    ));

    assert!(AppState::from_config(test_config(dir.path()), agent).is_ok());
}

#[tokio::test]
async fn test_unknown_category_dispatches_nothing() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(1)));
    let state = test_state(agent.clone(), dir.path());

    let result = state.harvester.harvest("IN", "gardening", None).await;
    assert!(matches!(result, Err(HarvestError::UnknownCategory(ref slug)) if slug == "gardening"));
    assert_eq!(agent.calls(), 0);
}

#[tokio::test]
async fn test_single_category_without_rows_is_not_found_and_not_cached() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::HeaderOnly));
    let state = test_state(agent.clone(), dir.path());

    let result = state.harvester.harvest("IN", "sports", None).await;
    assert!(matches!(result, Err(HarvestError::NoData { .. })));
    assert_eq!(state.harvester.cache_len(), 0);

    let _ = state.harvester.harvest("IN", "sports", None).await;
    assert_eq!(agent.calls(), 2);
}

#[tokio::test]
async fn test_single_category_success_is_tagged_and_cached() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(3)));
    let state = test_state(agent.clone(), dir.path());

    let response = state.harvester.harvest("gb", "Sports", None).await.unwrap();
    assert_eq!(response.geo, "GB");
    assert_eq!(response.selector, "sports");
    assert_eq!(response.total_categories, 1);
    assert_eq!(response.total_rows, 3);
    assert!(response.rows.iter().all(|r| r.category == "Sports" && r.category_id == 17));
    assert_eq!(response.category.as_ref().map(|c| c.id), Some(17));
    assert_eq!(response.rows[0].trend.explore_link, "https://example.test/c17/0");

    let cached = state.harvester.harvest("GB", "SPORTS", None).await.unwrap();
    assert!(cached.cached);
    assert_eq!(agent.calls(), 1);
}

#[tokio::test]
async fn test_requested_workers_are_clamped() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(1)));
    let state = test_state(agent, dir.path());
    let mut events = state.event_bus.subscribe();

    state.harvester.harvest("IN", "all", Some(50)).await.unwrap();

    let mut started_workers = None;
    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            HarvestEvent::HarvestStarted { workers, .. } => started_workers = Some(workers),
            HarvestEvent::CategoryCompleted { .. } => completed += 1,
            _ => {}
        }
    }
    assert_eq!(started_workers, Some(5));
    assert_eq!(completed, 20);
}

#[tokio::test]
async fn test_shared_directory_mode_claims_each_artifact_once() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.retrieval.isolate_task_dirs = false;
    let retrieval = Arc::new(config.retrieval.clone());

    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(2)));
    let detector = Arc::new(ArtifactClaimDetector::from_config(&retrieval));
    let scheduler = HarvestScheduler::new(agent, detector, retrieval);

    let registry = CategoryRegistry::global();
    let categories: Vec<_> = [1, 2, 3, 4].iter().map(|&id| registry.by_id(id).unwrap().clone()).collect();
    let report = scheduler.run_harvest("IN", &categories, 1).await;

    assert_eq!(report.success_count, 4);
    assert_eq!(report.total_rows(), 8);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_sequential_mode_tags_and_merges_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let retrieval = Arc::new(config.retrieval.clone());

    let agent = Arc::new(ScriptedAgent::new(Behavior::Rows(2)).with(2, Behavior::Fail));
    let detector = Arc::new(ArtifactClaimDetector::from_config(&retrieval));
    let scheduler = HarvestScheduler::new(agent, detector, retrieval);

    let registry = CategoryRegistry::global();
    let categories: Vec<_> = [1, 2, 3].iter().map(|&id| registry.by_id(id).unwrap().clone()).collect();
    let report = scheduler.run_sequential("IN", &categories).await;

    assert_eq!(report.success_count, 2);
    assert_eq!(report.failed_count, 1);
    assert_eq!(report.artifacts().len(), 2);

    for artifact in report.artifacts() {
        let content = std::fs::read_to_string(&artifact).unwrap();
        assert!(content.starts_with("Category,Trends"));
    }

    let tagged = collect_tagged_artifacts(dir.path(), "csv").unwrap();
    assert_eq!(tagged.len(), 2);
    let merged = merge_artifacts(&tagged).unwrap();
    assert_eq!(merged.len(), 4);
    assert_eq!(merged.header[0], "Category");

    let names: HashSet<&str> = merged.rows.iter().map(|r| r.category.as_str()).collect();
    assert_eq!(names, HashSet::from(["Autos and vehicles", "Business and finance"]));
}
