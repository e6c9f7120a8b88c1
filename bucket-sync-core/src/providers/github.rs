use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{repository_path, USER_AGENT as AGENT};
use crate::contract::{GitHostClient, RemoteRepository};
use crate::error::ProviderError;

pub const GITHUB_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
/// GitHub stops serving search results after the first 1000.
const MAX_SEARCH_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    html_url: String,
    stargazers_count: u32,
}

#[derive(Debug, Deserialize)]
struct GitHubSearchResponse {
    #[serde(default)]
    items: Vec<GitHubRepository>,
}

impl From<GitHubRepository> for RemoteRepository {
    fn from(r: GitHubRepository) -> Self {
        RemoteRepository {
            uri: r.html_url,
            stars: r.stargazers_count,
        }
    }
}

/// GitHub REST API client.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ProviderError::Config(format!("invalid GitHub token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        info!(api_url, "Initialized GitHub client");
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GitHostClient for GitHubClient {
    async fn get_repository(&self, uri: &str) -> Result<Option<RemoteRepository>, ProviderError> {
        let path = repository_path(uri).ok_or_else(|| ProviderError::InvalidUri(uri.to_string()))?;
        let mut segments = path.split('/');
        let (Some(owner), Some(name)) = (segments.next(), segments.next()) else {
            return Err(ProviderError::InvalidUri(uri.to_string()));
        };

        let url = format!("{}/repos/{}/{}", self.api_url, owner, name);
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(uri, "GitHub repository not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let repository: GitHubRepository = response.json().await?;
        Ok(Some(repository.into()))
    }

    async fn search_repositories(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<Vec<RemoteRepository>, ProviderError> {
        let url = format!("{}/search/repositories", self.api_url);
        let mut results = Vec::new();
        let mut page = 1usize;

        while !token.is_cancelled() && results.len() < MAX_SEARCH_RESULTS {
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("q", query.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ProviderError::Status {
                    status: response.status().as_u16(),
                    url,
                });
            }
            let body: GitHubSearchResponse = response.json().await?;
            let count = body.items.len();
            results.extend(body.items.into_iter().map(RemoteRepository::from));
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(query, results = results.len(), "GitHub search finished");
        Ok(results)
    }
}
