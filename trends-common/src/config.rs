//! Configuration loading and validation
//!
//! Resolution priority (highest first):
//! 1. Command-line arguments (applied by each binary)
//! 2. Environment variables (`TRENDS_*`)
//! 3. TOML config file (explicit path, else `<config_dir>/trends/config.toml`)
//! 4. Compiled defaults
//!
//! Every value is validated once in [`HarvesterConfig::validate`]; callers
//! receive ready-to-use types such as [`WorkerBounds`] instead of re-checking
//! bounds inline.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Top-level configuration for the harvester service and CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Bind address for the HTTP server
    pub host: String,
    /// HTTP server port
    pub port: u16,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub workers: WorkerConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    /// Geographies offered to clients by default
    pub geographies: Vec<String>,
    /// Allowed CORS origins ("*" allows any)
    pub cors_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a harvested response stays fresh
    pub ttl_secs: u64,
}

/// Worker pool bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub min: usize,
    pub max: usize,
    /// Used when a request does not name a worker count
    pub default: usize,
}

/// Retrieval and artifact-detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Base URL; `geo` and `category` query pairs are appended per task
    pub base_url: String,
    /// Directory where artifacts are deposited and claimed
    pub download_dir: PathBuf,
    /// Seconds to wait for an artifact to appear
    pub artifact_timeout_secs: u64,
    /// Seconds the agent may run before it is killed
    pub agent_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Delay between detecting a candidate and claiming it
    pub settle_delay_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Pause between categories in sequential mode
    pub inter_task_delay_ms: u64,
    /// Give every task its own scratch directory under `download_dir`
    pub isolate_task_dirs: bool,
    /// Keep claimed artifacts on disk after their rows are read
    pub retain_artifacts: bool,
    /// Expected artifact file extension (without dot)
    pub extension: String,
    /// File name prefixes that are never treated as fresh artifacts
    pub exclude_prefixes: Vec<String>,
}

/// External retrieval agent invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Program that performs one category fetch
    pub program: Option<PathBuf>,
    /// Arguments; `{url}` and `{dir}` are substituted per task
    pub args: Vec<String>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            workers: WorkerConfig::default(),
            retrieval: RetrievalConfig::default(),
            agent: AgentConfig::default(),
            geographies: vec!["IN".to_string(), "US".to_string(), "GB".to_string()],
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 5,
            default: 3,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://trends.google.com/trending".to_string(),
            download_dir: PathBuf::from("temp_downloads"),
            artifact_timeout_secs: 40,
            agent_timeout_secs: 90,
            poll_interval_ms: 1000,
            settle_delay_ms: 1000,
            jitter_min_ms: 1000,
            jitter_max_ms: 3000,
            inter_task_delay_ms: 2000,
            isolate_task_dirs: true,
            retain_artifacts: false,
            extension: "csv".to_string(),
            exclude_prefixes: vec![
                "temp_".to_string(),
                "master_".to_string(),
                "merged_".to_string(),
            ],
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec!["{url}".to_string(), "{dir}".to_string()],
        }
    }
}

/// Validated worker count range
///
/// Requests name a desired worker count; [`WorkerBounds::clamp`] maps it into
/// the configured range. A count of 1 means strictly sequential execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerBounds {
    min: usize,
    max: usize,
    default: usize,
}

impl WorkerBounds {
    pub fn new(min: usize, max: usize, default: usize) -> Result<Self> {
        if min == 0 {
            return Err(Error::Config("workers.min must be at least 1".to_string()));
        }
        if min > max {
            return Err(Error::Config(format!(
                "workers.min ({}) exceeds workers.max ({})",
                min, max
            )));
        }
        if default < min || default > max {
            return Err(Error::Config(format!(
                "workers.default ({}) outside {}..={}",
                default, min, max
            )));
        }
        Ok(Self { min, max, default })
    }

    /// Map a requested worker count into range (None selects the default)
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).clamp(self.min, self.max)
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn default_workers(&self) -> usize {
        self.default
    }
}

impl HarvesterConfig {
    /// Load configuration following the documented priority order
    ///
    /// An explicit `path` must exist. Without one, the per-user config file is
    /// used when present; a missing file is not an error (defaults apply).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(found) => Self::from_file(&found)?,
                None => {
                    warn!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `TRENDS_*` environment variables on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(host) = env_string("TRENDS_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse::<u16>("TRENDS_PORT")? {
            self.port = port;
        }
        if let Some(level) = env_string("TRENDS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(ttl) = env_parse::<u64>("TRENDS_CACHE_TTL")? {
            self.cache.ttl_secs = ttl;
        }
        if let Some(max) = env_parse::<usize>("TRENDS_MAX_WORKERS")? {
            self.workers.max = max;
            self.workers.default = self.workers.default.min(max);
        }
        if let Some(timeout) = env_parse::<u64>("TRENDS_DOWNLOAD_TIMEOUT")? {
            self.retrieval.artifact_timeout_secs = timeout;
        }
        if let Some(dir) = env_string("TRENDS_DOWNLOAD_DIR") {
            self.retrieval.download_dir = PathBuf::from(dir);
        }
        if let Some(program) = env_string("TRENDS_AGENT_PROGRAM") {
            self.agent.program = Some(PathBuf::from(program));
        }
        if let Some(origins) = env_string("TRENDS_CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        WorkerBounds::new(self.workers.min, self.workers.max, self.workers.default)?;

        if self.cache.ttl_secs == 0 {
            return Err(Error::Config("cache.ttl_secs must be positive".to_string()));
        }
        let r = &self.retrieval;
        if r.artifact_timeout_secs == 0 || r.agent_timeout_secs == 0 {
            return Err(Error::Config("retrieval timeouts must be positive".to_string()));
        }
        if r.poll_interval_ms == 0 {
            return Err(Error::Config("retrieval.poll_interval_ms must be positive".to_string()));
        }
        if r.jitter_min_ms > r.jitter_max_ms {
            return Err(Error::Config(format!(
                "retrieval.jitter_min_ms ({}) exceeds jitter_max_ms ({})",
                r.jitter_min_ms, r.jitter_max_ms
            )));
        }
        if let Err(e) = Url::parse(&r.base_url) {
            return Err(Error::Config(format!("retrieval.base_url '{}': {}", r.base_url, e)));
        }
        if r.extension.trim().is_empty() {
            return Err(Error::Config("retrieval.extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// Validated worker range
    pub fn worker_bounds(&self) -> Result<WorkerBounds> {
        WorkerBounds::new(self.workers.min, self.workers.max, self.workers.default)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

impl RetrievalConfig {
    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_secs(self.artifact_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn inter_task_delay(&self) -> Duration {
        Duration::from_millis(self.inter_task_delay_ms)
    }

    /// Category URL for a geography
    ///
    /// `geo` and `category` are appended to any query already on `base_url`.
    pub fn category_url(&self, geo: &str, category_id: u32) -> String {
        match Url::parse(&self.base_url) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("geo", geo)
                    .append_pair("category", &category_id.to_string());
                url.into()
            }
            // Invalid base URLs are rejected by validate()
            Err(_) => self.base_url.clone(),
        }
    }
}

/// Per-user config file location (`~/.config/trends/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trends").join("config.toml"))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}='{}': {}", name, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvesterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.retrieval.artifact_timeout_secs, 40);
    }

    #[test]
    fn test_worker_bounds_clamp() {
        let bounds = WorkerBounds::new(1, 5, 3).unwrap();
        assert_eq!(bounds.clamp(None), 3);
        assert_eq!(bounds.clamp(Some(0)), 1);
        assert_eq!(bounds.clamp(Some(4)), 4);
        assert_eq!(bounds.clamp(Some(50)), 5);
    }

    #[test]
    fn test_worker_bounds_rejects_bad_ranges() {
        assert!(WorkerBounds::new(0, 5, 3).is_err());
        assert!(WorkerBounds::new(4, 2, 3).is_err());
        assert!(WorkerBounds::new(1, 5, 6).is_err());
    }

    #[test]
    fn test_category_url_template() {
        let retrieval = RetrievalConfig::default();
        assert_eq!(
            retrieval.category_url("IN", 18),
            "https://trends.google.com/trending?geo=IN&category=18"
        );
    }

    #[test]
    fn test_category_url_keeps_existing_query() {
        let retrieval = RetrievalConfig {
            base_url: "https://trends.google.com/trending?hl=en-US".to_string(),
            ..Default::default()
        };
        let url = retrieval.category_url("IN", 18);
        assert_eq!(url, "https://trends.google.com/trending?hl=en-US&geo=IN&category=18");
        assert_eq!(url.matches('?').count(), 1);
    }

    #[test]
    fn test_base_url_must_parse() {
        let mut config = HarvesterConfig::default();
        config.retrieval.base_url = "trends.google.com/trending".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_jitter_range_validation() {
        let mut config = HarvesterConfig::default();
        config.retrieval.jitter_min_ms = 5000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
