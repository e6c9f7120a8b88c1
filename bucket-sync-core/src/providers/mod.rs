//! Host-specific bucket resolution.
//!
//! A [`HostBucketsProvider`] binds a [`GitHostClient`] to the host name it serves.
//! [`resolve_bucket`] picks the first compatible provider for a bare URI.

pub mod github;
pub mod gitlab;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::contract::{BucketsProvider, GitHostClient};
use crate::error::ProviderError;
use crate::model::Bucket;

pub use github::GitHubClient;
pub use gitlab::GitLabClient;

pub(crate) const USER_AGENT: &str = concat!("bucket-sync/", env!("CARGO_PKG_VERSION"));

fn repository_uri_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?i)https?://(?P<host>[^/?#]+)/(?P<path>[^?#]+?)(?:\.git)?/?$")
            .expect("repository uri regex is valid")
    })
}

/// Host name of a web URI, lower-cased.
pub fn host_of(uri: &str) -> Option<String> {
    repository_uri_regex()
        .captures(uri.trim())
        .map(|c| c["host"].to_lowercase())
}

/// Repository path of a web URI (`owner/name`, or `group/subgroup/name` on GitLab).
pub fn repository_path(uri: &str) -> Option<String> {
    repository_uri_regex()
        .captures(uri.trim())
        .map(|c| c["path"].to_string())
}

/// Resolves URIs through one hosting API.
pub struct HostBucketsProvider {
    host: String,
    client: Arc<dyn GitHostClient>,
}

impl HostBucketsProvider {
    pub fn new(host: impl Into<String>, client: Arc<dyn GitHostClient>) -> Self {
        Self {
            host: host.into().to_lowercase(),
            client,
        }
    }
}

#[async_trait]
impl BucketsProvider for HostBucketsProvider {
    fn is_compatible(&self, uri: &str) -> bool {
        host_of(uri).is_some_and(|host| host == self.host || host.ends_with(&format!(".{}", self.host)))
    }

    async fn get_bucket(
        &self,
        uri: &str,
        token: &CancellationToken,
    ) -> Result<Option<Bucket>, ProviderError> {
        if token.is_cancelled() {
            return Ok(None);
        }
        let repository = self.client.get_repository(uri).await?;
        Ok(repository.map(|r| Bucket::new(r.uri, r.stars)))
    }
}

/// Resolve `uri` through the first compatible provider.
///
/// Unknown hosts, missing repositories and provider errors are logged and yield `None`.
pub async fn resolve_bucket(
    providers: &[Arc<dyn BucketsProvider>],
    uri: &str,
    token: &CancellationToken,
) -> Option<Bucket> {
    let Some(provider) = providers.iter().find(|p| p.is_compatible(uri)) else {
        warn!(uri, "[BUCKETS] No provider compatible with bucket uri");
        return None;
    };
    match provider.get_bucket(uri, token).await {
        Ok(Some(bucket)) => {
            debug!(uri, canonical = %bucket.uri, stars = bucket.stars, "[BUCKETS] Resolved bucket");
            Some(bucket)
        }
        Ok(None) => {
            warn!(uri, "[BUCKETS] Bucket not found");
            None
        }
        Err(e) => {
            warn!(uri, error = %e, "[BUCKETS] Unable to resolve bucket");
            None
        }
    }
}
