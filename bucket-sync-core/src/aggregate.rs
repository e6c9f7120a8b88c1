//! Merge bucket candidates from every source into one deduplicated, filtered set.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::contract::BucketsSource;
use crate::model::{bucket_key, BucketInfo};

pub struct BucketAggregator {
    official: Arc<dyn BucketsSource>,
    others: Vec<Arc<dyn BucketsSource>>,
    ignored: HashSet<String>,
}

impl BucketAggregator {
    pub fn new(
        official: Arc<dyn BucketsSource>,
        others: Vec<Arc<dyn BucketsSource>>,
        ignored: &[String],
    ) -> Self {
        Self {
            official,
            others,
            ignored: ignored.iter().map(|uri| bucket_key(uri)).collect(),
        }
    }

    /// Query all sources concurrently and merge their results.
    ///
    /// Official buckets come first, so a URI listed officially keeps `official = true`
    /// even when a search source also finds it.
    pub async fn aggregate(&self, token: &CancellationToken) -> Vec<BucketInfo> {
        let (official, others) = futures::join!(
            self.official.get_buckets(token),
            join_all(self.others.iter().map(|s| async move {
                let buckets = s.get_buckets(token).await;
                debug!(source = %s.name(), count = buckets.len(), "[BUCKETS] Source done");
                buckets
            }))
        );

        let candidates = official
            .into_iter()
            .map(|b| BucketInfo::new(b, true))
            .chain(others.into_iter().flatten().map(|b| BucketInfo::new(b, false)));
        let buckets = merge_buckets(candidates, &self.ignored);

        info!(
            total = buckets.len(),
            official = buckets.iter().filter(|b| b.official).count(),
            "[BUCKETS] Aggregated buckets"
        );
        buckets
    }
}

/// Deduplicate by case-insensitive URI (first occurrence wins) and drop ignored keys.
pub fn merge_buckets(
    candidates: impl IntoIterator<Item = BucketInfo>,
    ignored: &HashSet<String>,
) -> Vec<BucketInfo> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|b| seen.insert(b.key()))
        .filter(|b| !ignored.contains(&b.key()))
        .collect()
}
