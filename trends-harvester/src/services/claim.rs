//! Artifact claim detector
//!
//! Finds the artifact a retrieval agent just deposited and takes exclusive
//! ownership of it:
//!
//! 1. **Snapshot** the watched directory before the agent runs
//! 2. **Poll** until a file appears that is new, passes the [`ArtifactFilter`]
//!    and has the expected extension, or the timeout elapses
//! 3. **Claim** it by renaming to a unique category-tagged name under the
//!    claim lock
//!
//! Tasks sharing one watched directory may all see the same fresh file; the
//! rename under the claim lock guarantees only one of them owns it. The loser
//! observes [`ClaimError::Vanished`] and does not retry.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use trends_common::config::RetrievalConfig;
use trends_common::Category;
use uuid::Uuid;

/// Claim errors
#[derive(Debug, Error)]
pub enum ClaimError {
    /// No candidate appeared within the wait window
    #[error("no artifact appeared in {dir} within {timeout:?}")]
    Timeout { dir: PathBuf, timeout: Duration },

    /// Candidate disappeared before it could be renamed
    #[error("artifact vanished before claim: {0}")]
    Vanished(PathBuf),

    /// Directory listing or rename failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which file names count as fresh artifacts
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    extension: String,
    exclude_prefixes: Vec<String>,
}

impl ArtifactFilter {
    pub fn new(extension: impl Into<String>, exclude_prefixes: Vec<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_lowercase(),
            exclude_prefixes,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.extension.clone(), config.exclude_prefixes.clone())
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// True for unclaimed files with the expected extension
    pub fn accepts(&self, file_name: &str) -> bool {
        has_extension(file_name, &self.extension)
            && !self.exclude_prefixes.iter().any(|p| file_name.starts_with(p.as_str()))
            && claim_tag(file_name).is_none()
    }
}

impl Default for ArtifactFilter {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// File names present in a directory at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot(HashSet<String>);

impl Snapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Snapshot / poll / claim over a watched directory
pub struct ArtifactClaimDetector {
    filter: ArtifactFilter,
    poll_interval: Duration,
    settle_delay: Duration,
    /// Guards the rename step only; never held across an await
    claim_lock: Arc<Mutex<()>>,
}

impl ArtifactClaimDetector {
    pub fn new(filter: ArtifactFilter, poll_interval: Duration, settle_delay: Duration) -> Self {
        Self {
            filter,
            poll_interval,
            settle_delay,
            claim_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(
            ArtifactFilter::from_config(config),
            config.poll_interval(),
            config.settle_delay(),
        )
    }

    pub fn filter(&self) -> &ArtifactFilter {
        &self.filter
    }

    /// Record current file names (creates the directory if missing)
    pub async fn snapshot(&self, dir: &Path) -> Result<Snapshot, ClaimError> {
        tokio::fs::create_dir_all(dir).await.map_err(|source| ClaimError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Snapshot(list_file_names(dir).await?.into_iter().collect()))
    }

    /// Poll `watch_dir` until a fresh artifact appears
    ///
    /// Returns the unclaimed candidate path. When several candidates appear in
    /// the same poll the lexicographically smallest name wins.
    pub async fn await_artifact(
        &self,
        watch_dir: &Path,
        prior: &Snapshot,
        timeout: Duration,
    ) -> Result<PathBuf, ClaimError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(name) = self.find_candidate(watch_dir, prior).await? {
                tracing::debug!(dir = %watch_dir.display(), file = %name, "Artifact candidate detected");
                return Ok(watch_dir.join(name));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClaimError::Timeout {
                    dir: watch_dir.to_path_buf(),
                    timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Rename `candidate` to a unique tagged name inside `dest_dir`
    pub fn claim(&self, candidate: &Path, dest_dir: &Path, category: &Category) -> Result<PathBuf, ClaimError> {
        let target = dest_dir.join(claimed_file_name(category, self.filter.extension()));
        let _guard = self.claim_lock.lock().unwrap_or_else(|e| e.into_inner());

        if !candidate.exists() {
            return Err(ClaimError::Vanished(candidate.to_path_buf()));
        }

        match std::fs::rename(candidate, &target) {
            Ok(()) => {
                tracing::debug!(
                    from = %candidate.display(),
                    to = %target.display(),
                    "Artifact claimed"
                );
                Ok(target)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ClaimError::Vanished(candidate.to_path_buf()))
            }
            Err(source) => Err(ClaimError::Io {
                path: candidate.to_path_buf(),
                source,
            }),
        }
    }

    /// Wait for a fresh artifact, let it settle, then claim it
    pub async fn await_and_claim(
        &self,
        watch_dir: &Path,
        prior: &Snapshot,
        dest_dir: &Path,
        category: &Category,
        timeout: Duration,
    ) -> Result<PathBuf, ClaimError> {
        let candidate = self.await_artifact(watch_dir, prior, timeout).await?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.claim(&candidate, dest_dir, category)
    }

    async fn find_candidate(&self, dir: &Path, prior: &Snapshot) -> Result<Option<String>, ClaimError> {
        let names = list_file_names(dir).await?;
        Ok(names
            .into_iter()
            .filter(|name| !prior.contains(name) && self.filter.accepts(name))
            .min())
    }
}

/// Category id embedded in a claimed file name (`..._cat<id>_...`)
pub fn claim_tag(file_name: &str) -> Option<u32> {
    file_name.match_indices("_cat").find_map(|(idx, marker)| {
        let rest = &file_name[idx + marker.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let after = &rest[digits.len()..];
        if !digits.is_empty() && after.starts_with('_') {
            digits.parse().ok()
        } else {
            None
        }
    })
}

/// `<Name_With_Underscores>_cat<id>_<YYYYmmdd_HHMMSS_mmm>_<8 hex>.<ext>`
pub fn claimed_file_name(category: &Category, extension: &str) -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "{}_cat{}_{}_{}.{}",
        category.file_stem(),
        category.id,
        Utc::now().format("%Y%m%d_%H%M%S_%3f"),
        &unique[..8],
        extension
    )
}

fn has_extension(file_name: &str, extension: &str) -> bool {
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

async fn list_file_names(dir: &Path) -> Result<Vec<String>, ClaimError> {
    let io_err = |source| ClaimError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trends_common::CategoryRegistry;

    #[test]
    fn test_claim_tag_parsing() {
        assert_eq!(claim_tag("Sports_cat17_20250101_120000_123_ab12cd34.csv"), Some(17));
        assert_eq!(claim_tag("All_categories_cat0_20250101_120000_000_00000000.csv"), Some(0));
        assert_eq!(claim_tag("trending_IN_1d.csv"), None);
        assert_eq!(claim_tag("catalog_cat.csv"), None);
        assert_eq!(claim_tag("x_cat12.csv"), None);
    }

    #[test]
    fn test_filter_rejects_excluded_and_tagged_names() {
        let filter = ArtifactFilter::default();
        assert!(filter.accepts("trending_IN_1d_20250101.csv"));
        assert!(filter.accepts("TRENDING.CSV"));
        assert!(!filter.accepts("trending.csv.crdownload"));
        assert!(!filter.accepts("temp_trending.csv"));
        assert!(!filter.accepts("master_trends_IN_20250101_000000.csv"));
        assert!(!filter.accepts("merged_trends_20250101_000000.csv"));
        assert!(!filter.accepts("Sports_cat17_20250101_120000_123_ab12cd34.csv"));
    }

    #[test]
    fn test_claimed_name_is_tagged_and_unique() {
        let category = CategoryRegistry::global().by_id(3).unwrap();
        let a = claimed_file_name(category, "csv");
        let b = claimed_file_name(category, "csv");
        assert!(a.starts_with("Business_and_finance_cat3_"));
        assert!(a.ends_with(".csv"));
        assert_eq!(claim_tag(&a), Some(3));
        assert_ne!(a, b);
    }
}
