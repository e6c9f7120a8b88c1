//! Origins of bucket candidates.
//!
//! Every source yields plain [`Bucket`]s. Sources that only know bare URIs resolve them
//! through the configured [`BucketsProvider`]s so stars and canonical casing come from
//! the hosting API. A source never fails the run: problems are logged and it yields
//! whatever it could resolve.

pub mod manual_list;
pub mod official;
pub mod search;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::contract::{BucketsProvider, BucketsSource};
use crate::error::ProviderError;
use crate::model::Bucket;
use crate::providers::resolve_bucket;

pub use manual_list::ManualBucketsListSource;
pub use official::OfficialBucketsSource;
pub use search::SearchBucketsSource;

/// Upper bound on concurrent host API lookups while resolving one source's URIs.
pub const MAX_CONCURRENT_RESOLVES: usize = 8;

/// GET `url` and return the body as text. Non-success statuses are errors.
pub(crate) async fn fetch_text(http: &reqwest::Client, url: &str) -> Result<String, ProviderError> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ProviderError::Status {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}

/// Resolve every URI through the providers, keeping input order and dropping misses.
pub(crate) async fn resolve_all(
    providers: &[Arc<dyn BucketsProvider>],
    uris: &[String],
    token: &CancellationToken,
) -> Vec<Bucket> {
    if token.is_cancelled() {
        return Vec::new();
    }
    let lookups: Vec<_> = uris.iter().map(|uri| resolve_bucket(providers, uri, token)).collect();
    stream::iter(lookups)
        .buffered(MAX_CONCURRENT_RESOLVES)
        .filter_map(|bucket| async move { bucket })
        .collect()
        .await
}

/// A fixed list of URIs from configuration.
pub struct ManualBucketsSource {
    uris: Vec<String>,
    providers: Vec<Arc<dyn BucketsProvider>>,
}

impl ManualBucketsSource {
    pub fn new(uris: Vec<String>, providers: Vec<Arc<dyn BucketsProvider>>) -> Self {
        Self { uris, providers }
    }
}

#[async_trait]
impl BucketsSource for ManualBucketsSource {
    fn name(&self) -> String {
        "manual".to_string()
    }

    async fn get_buckets(&self, token: &CancellationToken) -> Vec<Bucket> {
        let buckets = resolve_all(&self.providers, &self.uris, token).await;
        info!(configured = self.uris.len(), resolved = buckets.len(), "[BUCKETS] Manual buckets resolved");
        buckets
    }
}
