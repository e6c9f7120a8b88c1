use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{repository_path, USER_AGENT as AGENT};
use crate::contract::{GitHostClient, RemoteRepository};
use crate::error::ProviderError;

pub const GITLAB_API_URL: &str = "https://gitlab.com/api/v4";

const PER_PAGE: usize = 100;
const PRIVATE_TOKEN: &str = "private-token";

#[derive(Debug, Deserialize)]
struct GitLabProject {
    web_url: String,
    #[serde(default)]
    star_count: u32,
}

impl From<GitLabProject> for RemoteRepository {
    fn from(p: GitLabProject) -> Self {
        RemoteRepository {
            uri: p.web_url,
            stars: p.star_count,
        }
    }
}

/// GitLab REST API (v4) client.
pub struct GitLabClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitLabClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&token)
                .map_err(|e| ProviderError::Config(format!("invalid GitLab token: {e}")))?;
            headers.insert(HeaderName::from_static(PRIVATE_TOKEN), value);
        }
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        info!(api_url, "Initialized GitLab client");
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GitHostClient for GitLabClient {
    async fn get_repository(&self, uri: &str) -> Result<Option<RemoteRepository>, ProviderError> {
        let path = repository_path(uri).ok_or_else(|| ProviderError::InvalidUri(uri.to_string()))?;
        // Project ids are the url-encoded namespace path.
        let url = format!("{}/projects/{}", self.api_url, path.replace('/', "%2F"));

        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(uri, "GitLab project not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let project: GitLabProject = response.json().await?;
        Ok(Some(project.into()))
    }

    async fn search_repositories(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<Vec<RemoteRepository>, ProviderError> {
        let url = format!("{}/projects", self.api_url);
        let mut results = Vec::new();
        let mut page = 1usize;

        while !token.is_cancelled() {
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("search", query.to_string()),
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
            let projects: Vec<GitLabProject> = response.json().await?;
            let count = projects.len();
            results.extend(projects.into_iter().map(RemoteRepository::from));
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(query, results = results.len(), "GitLab search finished");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_repository_encodes_the_namespace_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/group%2Fsub%2Fbucket"))
            .and(header("private-token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web_url": "https://gitlab.com/group/sub/bucket",
                "star_count": 3
            })))
            .mount(&server)
            .await;

        let client = GitLabClient::new(&server.uri(), Some("secret".into())).unwrap();
        let repository = client
            .get_repository("https://gitlab.com/group/sub/bucket.git")
            .await
            .unwrap();

        assert_eq!(
            repository,
            Some(RemoteRepository {
                uri: "https://gitlab.com/group/sub/bucket".into(),
                stars: 3
            })
        );
    }

    #[tokio::test]
    async fn get_repository_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitLabClient::new(&server.uri(), None).unwrap();
        assert_eq!(client.get_repository("https://gitlab.com/a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_stops_on_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects"))
            .and(query_param("search", "scoop"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"web_url": "https://gitlab.com/a/scoop", "star_count": 1},
                {"web_url": "https://gitlab.com/b/scoop"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitLabClient::new(&server.uri(), None).unwrap();
        let results = client
            .search_repositories("scoop", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].stars, 0);
    }

    #[tokio::test]
    async fn search_does_nothing_when_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let client = GitLabClient::new(&server.uri(), None).unwrap();
        let results = client.search_repositories("scoop", &token).await.unwrap();
        assert!(results.is_empty());
    }
}
