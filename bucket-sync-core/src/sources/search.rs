use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::contract::{BucketsSource, GitHostClient};
use crate::model::Bucket;

/// Runs search queries against one host. Stars come straight from the search results.
pub struct SearchBucketsSource {
    name: String,
    client: Arc<dyn GitHostClient>,
    queries: Vec<String>,
}

impl SearchBucketsSource {
    pub fn new(name: impl Into<String>, client: Arc<dyn GitHostClient>, queries: Vec<String>) -> Self {
        Self {
            name: name.into(),
            client,
            queries,
        }
    }
}

#[async_trait]
impl BucketsSource for SearchBucketsSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn get_buckets(&self, token: &CancellationToken) -> Vec<Bucket> {
        let mut buckets = Vec::new();
        for query in &self.queries {
            if token.is_cancelled() {
                warn!(source = %self.name, "[BUCKETS] Search cancelled");
                break;
            }
            match self.client.search_repositories(query, token).await {
                Ok(repositories) => {
                    info!(source = %self.name, query, found = repositories.len(), "[BUCKETS] Search query done");
                    buckets.extend(repositories.into_iter().map(|r| Bucket::new(r.uri, r.stars)));
                }
                Err(e) => {
                    warn!(source = %self.name, query, error = %e, "[BUCKETS] Search query failed");
                }
            }
        }
        buckets
    }
}
