//! Data model shared by the crawl and reconcile phases.
//!
//! A manifest moves through two phases, each its own type:
//! - [`CrawledManifest`]: produced by the crawler from one file of one working copy,
//!   carrying only provenance that the repository itself can tell.
//! - [`ManifestInfo`]: the indexable document, created by attaching repository-level
//!   metadata (stars, official flag) with [`CrawledManifest::with_repository_metadata`].
//!   Reconciliation may re-tag it once with [`ManifestInfo::mark_duplicate_of`].
//!
//! Both steps consume `self`, so the phase order is enforced by ownership rather than
//! by mutating a shared object.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One discovered manifest repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub uri: String,
    pub stars: u32,
}

impl Bucket {
    pub fn new(uri: impl Into<String>, stars: u32) -> Self {
        Self {
            uri: uri.into(),
            stars,
        }
    }

    /// Identity key: hosts are inconsistent about casing, so buckets compare lower-cased.
    pub fn key(&self) -> String {
        bucket_key(&self.uri)
    }
}

/// Lower-cased identity of a bucket URI, trailing slash removed.
pub fn bucket_key(uri: &str) -> String {
    uri.trim_end_matches('/').to_lowercase()
}

/// A bucket enriched with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub uri: String,
    pub stars: u32,
    /// True iff the bucket came from the curated official list.
    pub official: bool,
}

impl BucketInfo {
    pub fn new(bucket: Bucket, official: bool) -> Self {
        Self {
            uri: bucket.uri,
            stars: bucket.stars,
            official,
        }
    }

    pub fn key(&self) -> String {
        bucket_key(&self.uri)
    }
}

/// One commit that touched a tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<FixedOffset>,
    pub sha: String,
}

/// Provenance known after crawling a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledMetadata {
    pub repository: String,
    pub branch_name: String,
    pub file_path: String,
    pub committed: DateTime<FixedOffset>,
    pub sha: String,
    pub manifest_hash: String,
}

/// A parsed manifest before repository metadata is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledManifest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub version: Option<String>,
    pub metadata: CrawledMetadata,
}

impl CrawledManifest {
    /// Attach stars and the official flag, producing the indexable document.
    pub fn with_repository_metadata(self, stars: u32, official: bool) -> ManifestInfo {
        let CrawledManifest {
            id,
            name,
            description,
            homepage,
            license,
            version,
            metadata,
        } = self;

        ManifestInfo {
            id,
            name_partial: name.clone(),
            name_suffix: name.clone(),
            name_sortable: name.to_lowercase(),
            name,
            description,
            homepage,
            license,
            version,
            metadata: ManifestMetadata {
                repository: metadata.repository,
                branch_name: metadata.branch_name,
                file_path: metadata.file_path,
                committed: metadata.committed,
                sha: metadata.sha,
                manifest_hash: metadata.manifest_hash,
                repository_stars: stars,
                official_repository: official,
                official_repository_number: u8::from(official),
                duplicate_of: None,
            },
        }
    }
}

/// Provenance and facet data of an indexed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestMetadata {
    pub repository: String,
    pub branch_name: String,
    pub file_path: String,
    pub committed: DateTime<FixedOffset>,
    pub sha: String,
    /// Content hash used for duplicate detection only; never persisted.
    #[serde(skip)]
    pub manifest_hash: String,
    pub repository_stars: u32,
    pub official_repository: bool,
    pub official_repository_number: u8,
    #[serde(default)]
    pub duplicate_of: Option<String>,
}

/// The indexable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestInfo {
    pub id: String,
    pub name: String,
    pub name_sortable: String,
    pub name_partial: String,
    pub name_suffix: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub metadata: ManifestMetadata,
}

impl ManifestInfo {
    /// Tag this manifest as a verbatim mirror of `original_id`.
    pub fn mark_duplicate_of(mut self, original_id: impl Into<String>) -> Self {
        self.metadata.duplicate_of = Some(original_id.into());
        self
    }

    /// The minimal partial document carrying only the duplicate back-reference.
    pub fn duplicate_patch(&self) -> ManifestPatch {
        ManifestPatch {
            id: self.id.clone(),
            duplicate_of: self.metadata.duplicate_of.clone(),
        }
    }
}

/// A metadata-only update touching `Metadata.DuplicateOf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestPatch {
    pub id: String,
    pub duplicate_of: Option<String>,
}
