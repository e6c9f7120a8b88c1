use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::providers::github::GITHUB_API_URL;
use crate::providers::gitlab::GITLAB_API_URL;

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchroniseConfig {
    /// Scratch area for working copies.
    pub work_dir: PathBuf,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    pub index: IndexConfig,
    #[serde(default)]
    pub buckets: BucketsConfig,
    #[serde(default)]
    pub github: Option<HostConfig>,
    #[serde(default)]
    pub gitlab: Option<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketsConfig {
    #[serde(default)]
    pub official_list_url: Option<String>,
    #[serde(default)]
    pub manual: Vec<String>,
    #[serde(default)]
    pub manual_list_url: Option<String>,
    #[serde(default)]
    pub ignored: Vec<String>,
}

/// One git hosting API. A missing section disables the host.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Defaults to the public API of the host.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub search_queries: Vec<String>,
    /// Injected from the environment, never read from or written to the file.
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfig")
            .field("api_url", &self.api_url)
            .field("search_queries", &self.search_queries)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HostConfig {
    pub fn github_api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(GITHUB_API_URL)
    }

    pub fn gitlab_api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(GITLAB_API_URL)
    }
}

impl SynchroniseConfig {
    pub fn trace_loaded(&self) {
        info!(
            work_dir = %self.work_dir.display(),
            index = %self.index.path.display(),
            max_concurrency = self.max_concurrency,
            manual_buckets = self.buckets.manual.len(),
            ignored_buckets = self.buckets.ignored.len(),
            github = self.github.is_some(),
            gitlab = self.gitlab.is_some(),
            "Loaded SynchroniseConfig"
        );
        debug!(?self, "SynchroniseConfig loaded (full debug)");
    }
}
