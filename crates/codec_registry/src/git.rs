use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for materializing a remote codec repository on disk.
///
/// The registry calls `clone_repo` for cache misses and `update_repo`
/// for cache hits; update failures are tolerated and the stale checkout
/// is used as-is.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    /// Clone the repository at `url` into `dest`
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Refresh an existing checkout at `dest`
    async fn update_repo(&self, dest: &Path) -> Result<()>;
}

/// `RepoFetcher` backed by the `git` CLI.
///
/// Clones are shallow; both operations run under a timeout so a dead
/// remote cannot stall uplink handling.
pub struct GitCliFetcher {
    clone_timeout: Duration,
    pull_timeout: Duration,
}

impl GitCliFetcher {
    pub fn new() -> Self {
        Self {
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    pub fn with_timeouts(clone_timeout: Duration, pull_timeout: Duration) -> Self {
        Self {
            clone_timeout,
            pull_timeout,
        }
    }

    async fn run(command: &mut Command, timeout: Duration, action: &str) -> Result<()> {
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| anyhow!("git {action} timed out after {timeout:?}"))?
            .with_context(|| format!("failed to spawn git {action}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {action} failed: {}", stderr.trim()));
        }

        Ok(())
    }
}

impl Default for GitCliFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoFetcher for GitCliFetcher {
    #[instrument(skip(self))]
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("cloning codec repository");

        let mut command = Command::new("git");
        command
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(url)
            .arg(dest);

        Self::run(&mut command, self.clone_timeout, "clone").await
    }

    #[instrument(skip(self))]
    async fn update_repo(&self, dest: &Path) -> Result<()> {
        debug!("refreshing codec repository");

        let mut command = Command::new("git");
        command.arg("-C").arg(dest).arg("pull").arg("--ff-only");

        Self::run(&mut command, self.pull_timeout, "pull").await
    }
}

/// Turn a repository URL into a filesystem-safe cache directory name.
///
/// Well-known host prefixes are stripped so the key stays readable;
/// anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_cache_key(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let stripped = trimmed
        .strip_prefix("https://github.com/")
        .or_else(|| trimmed.strip_prefix("http://github.com/"))
        .unwrap_or(trimmed);

    stripped
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}
