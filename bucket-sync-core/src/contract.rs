#![allow(unused)]

//! Async seams between the pipeline and its external collaborators.
//!
//! *NOTE:* This file is the *interface* only. Concrete implementations live in
//! [`crate::providers`], [`crate::sources`] and [`crate::index`]; mocks are generated
//! for every trait (exported with the `test-export-mocks` feature).

use std::collections::BTreeSet;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, ProviderError};
use crate::model::{Bucket, ManifestInfo, ManifestPatch};

/// A repository as reported by a hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    /// Canonical web URI (after redirects).
    pub uri: String,
    pub stars: u32,
}

/// Client for one git hosting API (GitHub-like, GitLab-like).
///
/// Implementations are expected to sit behind an HTTP stack that already retries
/// transient and rate-limit failures: an `Err` here is final for the call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitHostClient: Send + Sync {
    /// Look up a repository by its web URI. `Ok(None)` when it does not exist.
    async fn get_repository(&self, uri: &str) -> Result<Option<RemoteRepository>, ProviderError>;

    /// Run one repository search query, following pagination.
    async fn search_repositories(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<Vec<RemoteRepository>, ProviderError>;
}

/// Resolves bucket URIs on one host.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BucketsProvider: Send + Sync {
    /// Whether `uri` belongs to this provider's host (case-insensitive suffix match).
    fn is_compatible(&self, uri: &str) -> bool;

    /// Canonical bucket info for `uri`, or `None` when the repository is not found.
    /// Calling this with an incompatible URI is a caller error.
    async fn get_bucket(
        &self,
        uri: &str,
        token: &CancellationToken,
    ) -> Result<Option<Bucket>, ProviderError>;
}

/// One origin of bucket candidates.
///
/// Sources never fail the run: problems are logged and the source yields what it has.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BucketsSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> String;

    async fn get_buckets(&self, token: &CancellationToken) -> Vec<Bucket>;
}

/// The persisted search index, seen as a document store keyed by manifest Id.
///
/// Implementations page through results internally: every read returns the complete set.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn get_all_manifests(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, IndexError>;

    /// Manifests whose repository is one of `repositories` (case-insensitive).
    async fn get_manifests_for_repositories(
        &self,
        repositories: Vec<String>,
        token: &CancellationToken,
    ) -> Result<Vec<ManifestInfo>, IndexError>;

    /// Distinct repository URIs present in the index (facet over `Metadata.Repository`).
    async fn get_all_bucket_uris(
        &self,
        token: &CancellationToken,
    ) -> Result<BTreeSet<String>, IndexError>;

    /// Insert or fully replace documents.
    async fn upsert_manifests(
        &self,
        manifests: Vec<ManifestInfo>,
        token: &CancellationToken,
    ) -> Result<(), IndexError>;

    async fn delete_manifests(
        &self,
        manifests: Vec<ManifestInfo>,
        token: &CancellationToken,
    ) -> Result<(), IndexError>;

    /// Partial updates touching only `Metadata.DuplicateOf`.
    async fn patch_manifests(
        &self,
        patches: Vec<ManifestPatch>,
        token: &CancellationToken,
    ) -> Result<(), IndexError>;
}
