use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{fetch_text, resolve_all};
use crate::contract::{BucketsProvider, BucketsSource};
use crate::model::Bucket;

const URL_COLUMN: &str = "url";

/// A remotely hosted CSV list of buckets with a `url` column.
pub struct ManualBucketsListSource {
    http: reqwest::Client,
    url: Option<String>,
    providers: Vec<Arc<dyn BucketsProvider>>,
}

impl ManualBucketsListSource {
    pub fn new(
        http: reqwest::Client,
        url: Option<String>,
        providers: Vec<Arc<dyn BucketsProvider>>,
    ) -> Self {
        Self { http, url, providers }
    }
}

#[async_trait]
impl BucketsSource for ManualBucketsListSource {
    fn name(&self) -> String {
        "manual-list".to_string()
    }

    async fn get_buckets(&self, token: &CancellationToken) -> Vec<Bucket> {
        let Some(url) = self.url.as_deref() else {
            return Vec::new();
        };
        let body = match fetch_text(&self.http, url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url, error = %e, "[BUCKETS] Unable to read manual bucket list");
                return Vec::new();
            }
        };
        let Some(uris) = parse_url_column(&body) else {
            warn!(url, "[BUCKETS] Manual bucket list has no '{URL_COLUMN}' column");
            return Vec::new();
        };
        let buckets = resolve_all(&self.providers, &uris, token).await;
        info!(listed = uris.len(), resolved = buckets.len(), "[BUCKETS] Manual list buckets resolved");
        buckets
    }
}

/// Values of the `url` column, `.git` suffix stripped. `None` when the header lacks it.
pub fn parse_url_column(csv: &str) -> Option<Vec<String>> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = split_record(lines.next()?);
    let column = header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(URL_COLUMN))?;

    let uris = lines
        .filter_map(|line| split_record(line).into_iter().nth(column))
        .map(|value| {
            let value = value.trim();
            value.strip_suffix(".git").unwrap_or(value).to_string()
        })
        .filter(|value| !value.is_empty())
        .collect();
    Some(uris)
}

/// Split one CSV record. Double-quoted fields may contain commas and `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
