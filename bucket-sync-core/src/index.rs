//! [`SearchClient`] implementations.
//!
//! - [`FileIndex`]: a JSON document store keyed by manifest Id. Every write rewrites the
//!   file through a temporary sibling and a rename, so a crash never leaves half a file.
//! - [`Timed`]: wraps any client and logs the latency of each call.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::SearchClient;
use crate::error::IndexError;
use crate::model::{bucket_key, ManifestInfo, ManifestPatch};

type Documents = BTreeMap<String, ManifestInfo>;

pub struct FileIndex {
    path: Option<PathBuf>,
    documents: Mutex<Documents>,
}

impl FileIndex {
    /// Load the index at `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let manifests: Vec<ManifestInfo> = serde_json::from_slice(&bytes)?;
                manifests.into_iter().map(|m| (m.id.clone(), m)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), documents = documents.len(), "[INDEX] Opened file index");
        Ok(Self {
            path: Some(path),
            documents: Mutex::new(documents),
        })
    }

    /// A non-persistent index.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: Mutex::new(Documents::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, documents: &Documents) -> Result<(), IndexError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&documents.values().collect::<Vec<_>>())?;
        let temporary = temporary_path(path);
        tokio::fs::write(&temporary, body).await?;
        tokio::fs::rename(&temporary, path).await?;
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl SearchClient for FileIndex {
    async fn get_all_manifests(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, IndexError> {
        Ok(self.documents.lock().await.values().cloned().collect())
    }

    async fn get_manifests_for_repositories(
        &self,
        repositories: Vec<String>,
        _token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, IndexError> {
        let keys: HashSet<String> = repositories.iter().map(|r| bucket_key(r)).collect();
        Ok(self
            .documents
            .lock()
            .await
            .values()
            .filter(|m| keys.contains(&bucket_key(&m.metadata.repository)))
            .cloned()
            .collect())
    }

    async fn get_all_bucket_uris(
        &self,
        _token: &CancellationToken,
    ) -> Result<BTreeSet<String>, IndexError> {
        Ok(self
            .documents
            .lock()
            .await
            .values()
            .map(|m| m.metadata.repository.clone())
            .collect())
    }

    async fn upsert_manifests(
        &self,
        manifests: Vec<ManifestInfo>,
        _token: &CancellationToken,
    ) -> Result<(), IndexError> {
        if manifests.is_empty() {
            return Ok(());
        }
        let mut documents = self.documents.lock().await;
        for manifest in manifests {
            documents.insert(manifest.id.clone(), manifest);
        }
        self.persist(&documents).await
    }

    async fn delete_manifests(
        &self,
        manifests: Vec<ManifestInfo>,
        _token: &CancellationToken,
    ) -> Result<(), IndexError> {
        if manifests.is_empty() {
            return Ok(());
        }
        let mut documents = self.documents.lock().await;
        for manifest in &manifests {
            documents.remove(&manifest.id);
        }
        self.persist(&documents).await
    }

    async fn patch_manifests(
        &self,
        patches: Vec<ManifestPatch>,
        _token: &CancellationToken,
    ) -> Result<(), IndexError> {
        if patches.is_empty() {
            return Ok(());
        }
        let mut documents = self.documents.lock().await;
        for patch in patches {
            match documents.get_mut(&patch.id) {
                Some(document) => document.metadata.duplicate_of = patch.duplicate_of,
                None => warn!(id = %patch.id, "[INDEX] Patch for unknown document ignored"),
            }
        }
        self.persist(&documents).await
    }
}

/// Logs how long each call to the wrapped client takes.
pub struct Timed<S> {
    inner: S,
}

impl<S> Timed<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn log_elapsed(operation: &str, started: Instant) {
    debug!(operation, elapsed_ms = started.elapsed().as_millis() as u64, "[INDEX] Call finished");
}

#[async_trait]
impl<S: SearchClient> SearchClient for Timed<S> {
    async fn get_all_manifests(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, IndexError> {
        let started = Instant::now();
        let result = self.inner.get_all_manifests(token).await;
        log_elapsed("get_all_manifests", started);
        result
    }

    async fn get_manifests_for_repositories(
        &self,
        repositories: Vec<String>,
        token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, IndexError> {
        let started = Instant::now();
        let result = self.inner.get_manifests_for_repositories(repositories, token).await;
        log_elapsed("get_manifests_for_repositories", started);
        result
    }

    async fn get_all_bucket_uris(
        &self,
        token: &CancellationToken,
    ) -> Result<BTreeSet<String>, IndexError> {
        let started = Instant::now();
        let result = self.inner.get_all_bucket_uris(token).await;
        log_elapsed("get_all_bucket_uris", started);
        result
    }

    async fn upsert_manifests(
        &self,
        manifests: Vec<ManifestInfo>,
        token: &CancellationToken,
    ) -> Result<(), IndexError> {
        let started = Instant::now();
        let result = self.inner.upsert_manifests(manifests, token).await;
        log_elapsed("upsert_manifests", started);
        result
    }

    async fn delete_manifests(
        &self,
        manifests: Vec<ManifestInfo>,
        token: &CancellationToken,
    ) -> Result<(), IndexError> {
        let started = Instant::now();
        let result = self.inner.delete_manifests(manifests, token).await;
        log_elapsed("delete_manifests", started);
        result
    }

    async fn patch_manifests(
        &self,
        patches: Vec<ManifestPatch>,
        token: &CancellationToken,
    ) -> Result<(), IndexError> {
        let started = Instant::now();
        let result = self.inner.patch_manifests(patches, token).await;
        log_elapsed("patch_manifests", started);
        result
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::manifest;
    use super::*;
    use crate::contract::MockSearchClient;

    #[tokio::test]
    async fn file_index_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let token = CancellationToken::new();

        let index = FileIndex::open(&path).await.unwrap();
        assert!(index.is_empty().await);
        index
            .upsert_manifests(
                vec![
                    manifest("https://github.com/a/one", "app", "s1", 1),
                    manifest("https://github.com/b/two", "tool", "s2", 2),
                ],
                &token,
            )
            .await
            .unwrap();
        assert!(path.exists());
        assert!(!temporary_path(&path).exists());

        let reopened = FileIndex::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let all = reopened.get_all_manifests(&token).await.unwrap();
        assert!(all.iter().all(|m| m.metadata.manifest_hash.is_empty()), "hash is never persisted");
    }

    #[tokio::test]
    async fn file_index_queries_by_repository_case_insensitively() {
        let index = FileIndex::in_memory();
        let token = CancellationToken::new();
        index
            .upsert_manifests(
                vec![
                    manifest("https://github.com/A/One", "app", "s1", 1),
                    manifest("https://github.com/b/two", "tool", "s2", 2),
                ],
                &token,
            )
            .await
            .unwrap();

        let found = index
            .get_manifests_for_repositories(vec!["https://github.com/a/one".into()], &token)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "app");

        let uris = index.get_all_bucket_uris(&token).await.unwrap();
        assert_eq!(
            uris.into_iter().collect::<Vec<_>>(),
            vec!["https://github.com/A/One".to_string(), "https://github.com/b/two".to_string()]
        );
    }

    #[tokio::test]
    async fn file_index_patches_and_deletes() {
        let index = FileIndex::in_memory();
        let token = CancellationToken::new();
        let app = manifest("https://github.com/a/one", "app", "s1", 1);
        let tool = manifest("https://github.com/b/two", "tool", "s2", 2);
        index
            .upsert_manifests(vec![app.clone(), tool.clone()], &token)
            .await
            .unwrap();

        index
            .patch_manifests(
                vec![
                    ManifestPatch { id: tool.id.clone(), duplicate_of: Some(app.id.clone()) },
                    ManifestPatch { id: "unknown".into(), duplicate_of: None },
                ],
                &token,
            )
            .await
            .unwrap();
        index.delete_manifests(vec![app.clone()], &token).await.unwrap();

        let all = index.get_all_manifests(&token).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, tool.id);
        assert_eq!(all[0].metadata.duplicate_of.as_deref(), Some(app.id.as_str()));
    }

    #[tokio::test]
    async fn timed_delegates_results_and_errors() {
        let mut inner = MockSearchClient::new();
        inner
            .expect_get_all_bucket_uris()
            .times(1)
            .returning(|_| Ok(BTreeSet::from(["https://github.com/a/b".to_string()])));
        inner
            .expect_upsert_manifests()
            .times(1)
            .returning(|_, _| Err(IndexError::Backend("down".into())));
        let timed = Timed::new(inner);
        let token = CancellationToken::new();

        assert_eq!(timed.get_all_bucket_uris(&token).await.unwrap().len(), 1);
        assert!(matches!(
            timed.upsert_manifests(vec![], &token).await,
            Err(IndexError::Backend(_))
        ));
    }
}
