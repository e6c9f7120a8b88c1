//! High-level pipeline: aggregate buckets → crawl each → reconcile the index.
//!
//! This module wires the phases together and drives them for one run:
//!   - Aggregates bucket candidates from every configured source ([`BucketAggregator`])
//!   - Crawls the aggregated buckets on a bounded worker pool ([`FetchManifestsProcessor`])
//!   - Reconciles the search index against the crawled manifests ([`reconcile`])
//!
//! # Major Types
//! - [`Pipeline`]: the constructed collaborators for a run, built from [`SynchroniseConfig`]
//! - [`SynchroniseReport`]: counts of what was found, crawled and written
//!
//! # Error Handling
//! Bucket-level failures are counted and logged; the run carries on with the other buckets.
//! Only index failures abort the run.
//!
//! # Cancellation
//! The token is shared by every phase. A bucket cut short is counted as failed, and once the
//! token fires reconciliation is skipped altogether so a cancelled run never writes to the index.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregate::BucketAggregator;
use crate::config::SynchroniseConfig;
use crate::contract::{BucketsProvider, BucketsSource, GitHostClient, SearchClient};
use crate::crawl::ManifestCrawler;
use crate::error::{CrawlError, IndexError, ProviderError};
use crate::fetch::FetchManifestsProcessor;
use crate::git::RepositorySnapshotProvider;
use crate::model::BucketInfo;
use crate::providers::{GitHubClient, GitLabClient, HostBucketsProvider, USER_AGENT};
use crate::reconcile::{reconcile, ReconcileReport, ReconcileScope};
use crate::sources::{
    ManualBucketsListSource, ManualBucketsSource, OfficialBucketsSource, SearchBucketsSource,
};

const GITHUB_HOST: &str = "github.com";
const GITLAB_HOST: &str = "gitlab.com";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SynchroniseReport {
    pub buckets_found: usize,
    pub buckets_crawled: usize,
    pub buckets_failed: usize,
    pub manifests_found: usize,
    /// `None` when the run was cancelled before reconciliation.
    pub reconcile: Option<ReconcileReport>,
}

pub struct Pipeline {
    aggregator: BucketAggregator,
    processor: FetchManifestsProcessor,
    max_concurrency: usize,
}

impl Pipeline {
    pub fn new(
        aggregator: BucketAggregator,
        processor: FetchManifestsProcessor,
        max_concurrency: usize,
    ) -> Self {
        Self {
            aggregator,
            processor,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Build every source, provider and host client the configuration enables.
    pub fn from_config(config: &SynchroniseConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let mut providers: Vec<Arc<dyn BucketsProvider>> = Vec::new();
        let mut searches: Vec<Arc<dyn BucketsSource>> = Vec::new();

        if let Some(github) = &config.github {
            let client: Arc<dyn GitHostClient> =
                Arc::new(GitHubClient::new(github.github_api_url(), github.token.clone())?);
            providers.push(Arc::new(HostBucketsProvider::new(GITHUB_HOST, Arc::clone(&client))));
            searches.push(Arc::new(SearchBucketsSource::new(
                "github",
                client,
                github.search_queries.clone(),
            )));
        }
        if let Some(gitlab) = &config.gitlab {
            let client: Arc<dyn GitHostClient> =
                Arc::new(GitLabClient::new(gitlab.gitlab_api_url(), gitlab.token.clone())?);
            providers.push(Arc::new(HostBucketsProvider::new(GITLAB_HOST, Arc::clone(&client))));
            searches.push(Arc::new(SearchBucketsSource::new(
                "gitlab",
                client,
                gitlab.search_queries.clone(),
            )));
        }

        let buckets = &config.buckets;
        let official = Arc::new(OfficialBucketsSource::new(
            http.clone(),
            buckets.official_list_url.clone(),
            providers.clone(),
        ));
        let mut others = searches;
        others.push(Arc::new(ManualBucketsSource::new(
            buckets.manual.clone(),
            providers.clone(),
        )));
        others.push(Arc::new(ManualBucketsListSource::new(
            http,
            buckets.manual_list_url.clone(),
            providers,
        )));

        let aggregator = BucketAggregator::new(official, others, &buckets.ignored);
        let processor = FetchManifestsProcessor::new(ManifestCrawler::new(
            RepositorySnapshotProvider::new(&config.work_dir),
        ));
        Ok(Self::new(aggregator, processor, config.max_concurrency))
    }

    pub async fn buckets(&self, token: &CancellationToken) -> Vec<BucketInfo> {
        self.aggregator.aggregate(token).await
    }

    pub fn processor(&self) -> &FetchManifestsProcessor {
        &self.processor
    }
}

/// Run one full cycle against `search`.
pub async fn synchronise(
    pipeline: &Pipeline,
    search: &dyn SearchClient,
    token: &CancellationToken,
) -> Result<SynchroniseReport, IndexError> {
    info!("[SYNC] Starting synchronisation");
    let mut report = SynchroniseReport::default();
    if token.is_cancelled() {
        warn!("[SYNC] Cancelled before start");
        return Ok(report);
    }

    let buckets = pipeline.buckets(token).await;
    report.buckets_found = buckets.len();

    let processor = &pipeline.processor;
    let results: Vec<(&BucketInfo, Result<_, CrawlError>)> = stream::iter(&buckets)
        .map(|bucket| async move { (bucket, processor.process(bucket, token).await) })
        .buffer_unordered(pipeline.max_concurrency)
        .collect()
        .await;

    let mut manifests = Vec::new();
    let mut crawled = Vec::new();
    for (bucket, result) in results {
        match result {
            Ok(found) => {
                crawled.push(bucket.uri.clone());
                manifests.extend(found);
            }
            Err(CrawlError::Cancelled(uri)) => {
                warn!(repository = %uri, "[SYNC] Bucket crawl cancelled");
                report.buckets_failed += 1;
            }
            Err(e) => {
                error!(repository = %bucket.uri, error = %e, "[SYNC] Bucket crawl failed");
                report.buckets_failed += 1;
            }
        }
    }
    report.buckets_crawled = crawled.len();
    report.manifests_found = manifests.len();

    if token.is_cancelled() {
        warn!(
            crawled = report.buckets_crawled,
            "[SYNC] Cancelled after crawling, skipping reconciliation"
        );
        return Ok(report);
    }

    let scope = ReconcileScope {
        buckets: buckets.iter().map(|b| b.uri.clone()).collect(),
        crawled,
    };
    let reconciled = reconcile(search, manifests, &scope, token)
        .await
        .inspect_err(|e| error!(error = %e, "[SYNC] Reconciliation failed"))?;
    report.reconcile = Some(reconciled);

    info!(?report, "[SYNC] Synchronisation finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockBucketsSource, MockSearchClient};
    use crate::model::Bucket;

    fn pipeline_with(buckets: Vec<Bucket>, work_dir: &std::path::Path) -> Pipeline {
        let mut official = MockBucketsSource::new();
        official.expect_name().return_const("official".to_string());
        official
            .expect_get_buckets()
            .returning(move |_| buckets.clone());
        Pipeline::new(
            BucketAggregator::new(Arc::new(official), vec![], &[]),
            FetchManifestsProcessor::new(ManifestCrawler::new(RepositorySnapshotProvider::new(work_dir))),
            2,
        )
    }

    #[tokio::test]
    async fn cancelled_before_start_touches_nothing() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(vec![Bucket::new("https://github.com/a/b", 1)], work.path());
        let mut search = MockSearchClient::new();
        search.expect_get_all_bucket_uris().never();
        search.expect_get_all_manifests().never();
        let token = CancellationToken::new();
        token.cancel();

        let report = synchronise(&pipeline, &search, &token).await.unwrap();

        assert_eq!(report, SynchroniseReport::default());
    }

    #[tokio::test]
    async fn index_failure_aborts_the_run() {
        let work = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(vec![], work.path());
        let mut search = MockSearchClient::new();
        search
            .expect_get_all_bucket_uris()
            .returning(|_| Err(IndexError::Backend("down".into())));

        let result = synchronise(&pipeline, &search, &CancellationToken::new()).await;

        assert!(matches!(result, Err(IndexError::Backend(_))));
    }

    #[tokio::test]
    async fn unreachable_bucket_is_crawled_empty() {
        let work = tempfile::tempdir().unwrap();
        let missing = work.path().join("does-not-exist");
        let pipeline = pipeline_with(vec![Bucket::new(missing.to_str().unwrap(), 0)], work.path());
        let mut search = MockSearchClient::new();
        search.expect_get_all_bucket_uris().returning(|_| Ok(Default::default()));
        search.expect_get_all_manifests().returning(|_| Ok(vec![]));

        let report = synchronise(&pipeline, &search, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.buckets_found, 1);
        assert_eq!(report.buckets_crawled, 1);
        assert_eq!(report.manifests_found, 0);
        assert_eq!(report.reconcile, Some(ReconcileReport::default()));
    }
}
