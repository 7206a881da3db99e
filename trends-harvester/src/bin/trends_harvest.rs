//! Command-line trend harvester
//!
//! **Usage:**
//! ```bash
//! trends-harvest all [GEO] [--workers N]   # parallel harvest, writes master_trends_<GEO>_<ts>.csv
//! trends-harvest sequential [GEO]          # one category at a time, writes merged_trends_<ts>.csv
//! trends-harvest merge [DIR]               # merge tagged artifacts already on disk
//! trends-harvest url <URL>                 # fetch and tag a single category URL
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use trends_common::config::HarvesterConfig;
use trends_common::{Category, CategoryRegistry};
use url::Url;

use trends_harvester::models::{HarvestReport, MasterDataset, RetrievalOutcome, RetrievalTask};
use trends_harvester::services::{
    collect_tagged_artifacts, merge_artifacts, normalize_geo, tag_artifact, write_csv, ArtifactClaimDetector,
    CommandAgent, HarvestScheduler,
};

/// Trend harvester CLI
#[derive(Parser, Debug)]
#[command(name = "trends-harvest")]
#[command(about = "Harvest trend datasets from the command line")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "TRENDS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest every category in parallel
    All {
        /// Geography code (defaults to the first configured geography)
        geo: Option<String>,

        /// Concurrent workers, clamped into the configured bounds
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Harvest one category at a time and merge the tagged artifacts
    Sequential {
        geo: Option<String>,
    },

    /// Merge tagged artifacts in a directory (defaults to the download directory)
    Merge {
        dir: Option<PathBuf>,
    },

    /// Fetch a single category URL and tag the artifact
    Url {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = HarvesterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    trends_harvester::logging::init_tracing(&config.logging)?;

    // Claimed artifacts stay on disk for every CLI mode
    config.retrieval.retain_artifacts = true;
    tokio::fs::create_dir_all(&config.retrieval.download_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.retrieval.download_dir.display()))?;

    match args.command {
        Command::All { geo, workers } => run_all(&config, geo, workers).await,
        Command::Sequential { geo } => run_sequential(&config, geo).await,
        Command::Merge { dir } => {
            let dir = dir.unwrap_or_else(|| config.retrieval.download_dir.clone());
            run_merge(dir, config.retrieval.extension.clone()).await.map(|_| ())
        }
        Command::Url { url } => run_url(&config, &url).await,
    }
}

fn build_scheduler(config: &HarvesterConfig) -> HarvestScheduler {
    let agent = CommandAgent::from_config(&config.agent);
    let retrieval = Arc::new(config.retrieval.clone());
    let detector = Arc::new(ArtifactClaimDetector::from_config(&retrieval));
    HarvestScheduler::new(Arc::new(agent), detector, retrieval)
}

fn resolve_geo(config: &HarvesterConfig, geo: Option<String>) -> Result<String> {
    let raw = geo
        .or_else(|| config.geographies.first().cloned())
        .unwrap_or_else(|| "IN".to_string());
    Ok(normalize_geo(&raw)?)
}

async fn run_all(config: &HarvesterConfig, geo: Option<String>, workers: Option<usize>) -> Result<()> {
    let geo = resolve_geo(config, geo)?;
    let workers = config.worker_bounds()?.clamp(workers);
    let registry = CategoryRegistry::global();

    println!("Harvesting {} categories for {} with {} workers", registry.len(), geo, workers);

    let scheduler = build_scheduler(config);
    let report = scheduler.run_harvest(&geo, registry.all(), workers).await;

    let output = config.retrieval.download_dir.join(format!(
        "master_trends_{}_{}.csv",
        geo,
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    write_dataset(report.dataset.clone(), output.clone()).await?;

    print_summary(&report);
    println!("Master dataset: {}", output.display());
    Ok(())
}

async fn run_sequential(config: &HarvesterConfig, geo: Option<String>) -> Result<()> {
    let geo = resolve_geo(config, geo)?;
    let registry = CategoryRegistry::global();

    println!("Harvesting {} categories for {} sequentially", registry.len(), geo);

    let scheduler = build_scheduler(config);
    let report = scheduler.run_sequential(&geo, registry.all()).await;
    print_summary(&report);

    run_merge(config.retrieval.download_dir.clone(), config.retrieval.extension.clone()).await?;
    Ok(())
}

/// Merge every tagged artifact in `dir` into `merged_trends_<ts>.csv`
async fn run_merge(dir: PathBuf, extension: String) -> Result<PathBuf> {
    let output = dir.join(format!("merged_trends_{}.csv", Utc::now().format("%Y%m%d_%H%M%S")));
    let out = output.clone();

    let (files, rows) = tokio::task::spawn_blocking(move || -> Result<(usize, usize)> {
        let artifacts = collect_tagged_artifacts(&dir, &extension)?;
        let dataset = merge_artifacts(&artifacts)?;
        write_csv(&dataset, &out)?;
        Ok((artifacts.len(), dataset.len()))
    })
    .await
    .context("Merge task failed")??;

    info!(files, rows, output = %output.display(), "Artifacts merged");
    println!("Merged {} artifacts ({} rows) into {}", files, rows, output.display());
    Ok(output)
}

async fn run_url(config: &HarvesterConfig, url: &str) -> Result<()> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL '{}'", url))?;
    let category = url_category(&parsed)?;
    let geo = query_value(&parsed, "geo").unwrap_or_default().to_uppercase();

    println!("Fetching {} ({})", category.name, url);

    let scheduler = build_scheduler(config);
    let task = RetrievalTask::new(category.clone(), geo, url);
    let started = Instant::now();
    let result = scheduler.execute(task, true).await;

    match result.outcome {
        RetrievalOutcome::Success { rows, artifact } => {
            if let Some(path) = artifact {
                let tagged = path.clone();
                tokio::task::spawn_blocking(move || tag_artifact(&tagged, &category))
                    .await
                    .context("Tagging task failed")??;
                println!("Saved {} rows to {}", rows.len(), path.display());
            } else {
                println!("Retrieved {} rows", rows.len());
            }
        }
        RetrievalOutcome::Empty => println!("No data returned"),
        RetrievalOutcome::Failed(reason) => anyhow::bail!("Retrieval failed: {}", reason),
    }

    println!("Completed in {:.2}s", started.elapsed().as_secs_f64());
    Ok(())
}

async fn write_dataset(dataset: MasterDataset, path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || write_csv(&dataset, &path))
        .await
        .context("Write task failed")??;
    Ok(())
}

fn print_summary(report: &HarvestReport) {
    println!();
    println!("Successful: {}", report.success_count);
    println!("Empty:      {}", report.empty_count);
    println!("Failed:     {}", report.failed_count);
    println!("Total rows: {}", report.total_rows());
    println!("Time:       {:.2}s", report.duration.as_secs_f64());

    let artifacts = report.artifacts();
    if !artifacts.is_empty() {
        println!("Artifacts ({} total):", artifacts.len());
        for path in artifacts.iter().take(10) {
            println!("  {}", display_name(path));
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
}

/// Category named by the `category` query pair; a URL without one covers all categories
fn url_category(url: &Url) -> Result<Category> {
    let registry = CategoryRegistry::global();
    let id = match query_value(url, "category") {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("Invalid category id '{}'", raw))?,
        None => 0,
    };
    Ok(registry.by_id(id)?.clone())
}
