//! Manifest crawling for a single bucket.
//!
//! [`ManifestCrawler::crawl`] downloads a fresh snapshot and returns a [`Crawl`]: a lazy,
//! finite iterator over the bucket's manifests. It owns the working copy and deletes it
//! once exhausted or dropped, so a `Crawl` cannot be restarted; crawling again re-downloads.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CrawlError, SnapshotError};
use crate::git::{CommitsCache, RepositorySnapshot, RepositorySnapshotProvider};
use crate::manifest::{content_hash, parse_manifest};
use crate::model::{CrawledManifest, CrawledMetadata};

/// Conventional directory for nested-bucket layouts.
const BUCKET_DIRECTORY: &str = "bucket";

/// Directory manifests live in: `bucket` when the repository uses it, else the root.
pub fn manifest_scope(files: &[String]) -> &'static str {
    let prefix = format!("{BUCKET_DIRECTORY}/");
    if files.iter().any(|f| f.starts_with(&prefix)) {
        BUCKET_DIRECTORY
    } else {
        ""
    }
}

/// Whether `path` is a manifest under `scope`: a non-hidden `.json` file directly in it.
pub fn is_manifest_candidate(path: &str, scope: &str) -> bool {
    let (directory, file_name) = path.rsplit_once('/').unwrap_or(("", path));
    directory == scope
        && !file_name.starts_with('.')
        && file_name
            .rsplit_once('.')
            .is_some_and(|(stem, extension)| !stem.is_empty() && extension.eq_ignore_ascii_case("json"))
}

#[derive(Debug, Clone)]
pub struct ManifestCrawler {
    snapshots: RepositorySnapshotProvider,
}

impl ManifestCrawler {
    pub fn new(snapshots: RepositorySnapshotProvider) -> Self {
        Self { snapshots }
    }

    /// Download `uri` and prepare to enumerate its manifests.
    ///
    /// An unavailable repository yields an empty crawl; an unreadable history is an error
    /// for the whole bucket. Blocking: call from a blocking-capable thread.
    pub fn crawl(&self, uri: &str, token: &CancellationToken) -> Result<Crawl, CrawlError> {
        let Some(snapshot) = self.snapshots.download(uri, token) else {
            return Ok(Crawl::empty(uri, token));
        };

        let (candidates, branch_name, cache) = match prepare(&snapshot, token) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(repository = uri, error = %e, "[CRAWL] Unable to read repository history");
                snapshot.delete();
                return Err(e.into());
            }
        };

        info!(
            repository = uri,
            branch = %branch_name,
            candidates = candidates.len(),
            "[CRAWL] Crawling manifests"
        );

        Ok(Crawl {
            uri: uri.to_string(),
            branch_name,
            candidates: candidates.into_iter(),
            cache,
            snapshot: Some(snapshot),
            token: token.clone(),
        })
    }
}

fn prepare(
    snapshot: &RepositorySnapshot,
    token: &CancellationToken,
) -> Result<(Vec<String>, String, CommitsCache), SnapshotError> {
    let files = snapshot.files_from_index()?;
    let scope = manifest_scope(&files);
    let candidates: Vec<String> = files
        .into_iter()
        .filter(|path| is_manifest_candidate(path, scope))
        .collect();
    let branch_name = snapshot.branch_name()?;
    let cache = snapshot.commits_cache(|path| is_manifest_candidate(path, scope), token)?;
    Ok((candidates, branch_name, cache))
}

/// Lazy enumeration of one bucket's manifests, in file-listing order.
pub struct Crawl {
    uri: String,
    branch_name: String,
    candidates: std::vec::IntoIter<String>,
    cache: CommitsCache,
    snapshot: Option<RepositorySnapshot>,
    token: CancellationToken,
}

impl Crawl {
    fn empty(uri: &str, token: &CancellationToken) -> Self {
        Self {
            uri: uri.to_string(),
            branch_name: String::new(),
            candidates: Vec::new().into_iter(),
            cache: CommitsCache::new(),
            snapshot: None,
            token: token.clone(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn finish(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            debug!(repository = %self.uri, "[CRAWL] Deleting working copy");
            snapshot.delete();
        }
    }

    fn read_manifest(&self, snapshot: &RepositorySnapshot, path: &str) -> Option<CrawledManifest> {
        let Some(commit) = self.cache.get(path).and_then(|commits| commits.first()) else {
            warn!(repository = %self.uri, file_path = path, "[CRAWL] No commit found for manifest");
            return None;
        };

        let content = match snapshot.read_content(path) {
            Ok(content) => content,
            Err(e) => {
                error!(repository = %self.uri, file_path = path, error = %e, "[CRAWL] Unable to read manifest");
                return None;
            }
        };

        let metadata = CrawledMetadata {
            repository: self.uri.clone(),
            branch_name: self.branch_name.clone(),
            file_path: path.to_string(),
            committed: commit.date,
            sha: commit.sha.clone(),
            manifest_hash: content_hash(&content),
        };

        match parse_manifest(&content, metadata) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                error!(repository = %self.uri, file_path = path, error = %e, "[CRAWL] Unable to parse manifest");
                None
            }
        }
    }
}

impl Iterator for Crawl {
    type Item = CrawledManifest;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.token.is_cancelled() {
                warn!(repository = %self.uri, "[CRAWL] Cancelled, stopping enumeration");
                self.finish();
                return None;
            }
            let Some(path) = self.candidates.next() else {
                self.finish();
                return None;
            };
            let snapshot = self.snapshot.as_ref()?;
            if let Some(manifest) = self.read_manifest(snapshot, &path) {
                return Some(manifest);
            }
        }
    }
}

impl Drop for Crawl {
    fn drop(&mut self) {
        self.finish();
    }
}
