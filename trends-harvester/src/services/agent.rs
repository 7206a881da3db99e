//! Retrieval agent
//!
//! The agent performs one category fetch: given a URL and a working
//! directory it deposits a new artifact file there, or fails. It owns no
//! pipeline state; discovering and claiming the artifact is the job of the
//! [`ArtifactClaimDetector`](super::claim::ArtifactClaimDetector).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use trends_common::config::AgentConfig;

/// Retrieval agent errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// No agent program configured
    #[error("retrieval agent not configured")]
    NotConfigured,

    /// Program could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// Program ran but reported failure
    #[error("agent exited with status {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    /// Program exceeded its time budget and was killed
    #[error("agent timed out after {0:?}")]
    TimedOut(Duration),

    /// Any other agent-specific failure
    #[error("{0}")]
    Other(String),
}

/// One-shot category fetcher
#[async_trait]
pub trait RetrievalAgent: Send + Sync {
    /// Agent identifier for logs and health output
    fn name(&self) -> &str;

    /// Whether the agent can currently run (e.g. its program exists)
    fn is_available(&self) -> bool {
        true
    }

    /// Fetch `url`, depositing an artifact into `working_dir` within `timeout`
    async fn fetch(&self, url: &str, working_dir: &Path, timeout: Duration) -> Result<(), AgentError>;
}

/// Agent that runs an external program per fetch
///
/// Arguments are rendered per task: `{url}` and `{dir}` are replaced by the
/// category URL and the working directory. A non-zero exit status is a
/// failure. The child is killed when the timeout elapses.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: Some(program.into()),
            args,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    /// Arguments with placeholders substituted
    pub fn render_args(&self, url: &str, working_dir: &Path) -> Vec<String> {
        let dir = working_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{url}", url).replace("{dir}", &dir))
            .collect()
    }

    /// Resolve the program to an existing file (searching PATH for bare names)
    pub fn locate(&self) -> Option<PathBuf> {
        let program = self.program.as_ref()?;
        if program.components().count() > 1 || program.is_absolute() {
            return program.is_file().then(|| program.clone());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait]
impl RetrievalAgent for CommandAgent {
    fn name(&self) -> &str {
        "command"
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    async fn fetch(&self, url: &str, working_dir: &Path, timeout: Duration) -> Result<(), AgentError> {
        let program = self.program.as_ref().ok_or(AgentError::NotConfigured)?;
        let args = self.render_args(url, working_dir);

        tracing::debug!(program = %program.display(), ?args, "Starting retrieval agent");

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| AgentError::Other(e.to_string()))?,
            Err(_) => return Err(AgentError::TimedOut(timeout)),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AgentError::Exited {
                code: output.status.code(),
                stderr: stderr.trim().chars().take(200).collect(),
            })
        }
    }
}
