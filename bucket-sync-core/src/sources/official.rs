use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{fetch_text, resolve_all};
use crate::contract::{BucketsProvider, BucketsSource};
use crate::error::ProviderError;
use crate::model::Bucket;

/// The curated registry: a JSON object of `name → uri`.
pub struct OfficialBucketsSource {
    http: reqwest::Client,
    url: Option<String>,
    providers: Vec<Arc<dyn BucketsProvider>>,
}

impl OfficialBucketsSource {
    pub fn new(
        http: reqwest::Client,
        url: Option<String>,
        providers: Vec<Arc<dyn BucketsProvider>>,
    ) -> Self {
        Self { http, url, providers }
    }

    async fn fetch_uris(&self, url: &str) -> Result<Vec<String>, ProviderError> {
        let body = fetch_text(&self.http, url).await?;
        // Registry names are informational; only the values are buckets.
        let entries: BTreeMap<String, String> = serde_json::from_str(&body)?;
        Ok(entries.into_values().collect())
    }
}

#[async_trait]
impl BucketsSource for OfficialBucketsSource {
    fn name(&self) -> String {
        "official".to_string()
    }

    async fn get_buckets(&self, token: &CancellationToken) -> Vec<Bucket> {
        let Some(url) = self.url.as_deref() else {
            warn!("[BUCKETS] No official bucket list configured");
            return Vec::new();
        };
        let uris = match self.fetch_uris(url).await {
            Ok(uris) => uris,
            Err(e) => {
                warn!(url, error = %e, "[BUCKETS] Unable to read official bucket list");
                return Vec::new();
            }
        };
        let buckets = resolve_all(&self.providers, &uris, token).await;
        info!(listed = uris.len(), resolved = buckets.len(), "[BUCKETS] Official buckets resolved");
        buckets
    }
}
