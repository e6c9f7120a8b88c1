//! Per-bucket worker: crawl one bucket and attach its repository-level metadata.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawl::ManifestCrawler;
use crate::error::CrawlError;
use crate::model::{BucketInfo, ManifestInfo};

#[derive(Debug, Clone)]
pub struct FetchManifestsProcessor {
    crawler: Arc<ManifestCrawler>,
}

impl FetchManifestsProcessor {
    pub fn new(crawler: ManifestCrawler) -> Self {
        Self {
            crawler: Arc::new(crawler),
        }
    }

    /// Crawl `bucket` on a blocking thread and enrich every manifest with its stars and
    /// official flag.
    ///
    /// A crawl cut short by cancellation is reported as [`CrawlError::Cancelled`] so the
    /// partial result never reaches reconciliation.
    pub async fn process(
        &self,
        bucket: &BucketInfo,
        token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, CrawlError> {
        if token.is_cancelled() {
            return Err(CrawlError::Cancelled(bucket.uri.clone()));
        }

        let crawler = Arc::clone(&self.crawler);
        let uri = bucket.uri.clone();
        let worker_token = token.clone();
        let crawled = tokio::task::spawn_blocking(move || {
            crawler
                .crawl(&uri, &worker_token)
                .map(|crawl| crawl.collect::<Vec<_>>())
        })
        .await
        .map_err(|e| CrawlError::Worker(e.to_string()))??;

        if token.is_cancelled() {
            warn!(repository = %bucket.uri, partial = crawled.len(), "[FETCH] Crawl cancelled, discarding partial result");
            return Err(CrawlError::Cancelled(bucket.uri.clone()));
        }

        let manifests: Vec<ManifestInfo> = crawled
            .into_iter()
            .map(|m| m.with_repository_metadata(bucket.stars, bucket.official))
            .collect();
        info!(repository = %bucket.uri, manifests = manifests.len(), "[FETCH] Bucket processed");
        Ok(manifests)
    }
}
