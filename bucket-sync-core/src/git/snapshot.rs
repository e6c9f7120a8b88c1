//! Clone/update lifecycle of a bucket's working copy.
//!
//! Per bucket URI the working copy is either absent (clone) or present (fetch +
//! fast-forward). A present copy that cannot be updated is deleted and cloned once more.
//! A repository without a resolvable HEAD commit is discarded and reported as `None`.
//!
//! Working copy paths are derived from the URI alone, so concurrent workers crawling
//! different buckets never share a directory.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{ErrorCode, FetchOptions, Progress, RemoteCallbacks, Repository};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::SnapshotError;
use crate::git::commit_cache::{self, CommitsCache};
use crate::model::bucket_key;

const GIT_BLOB_MODE: u32 = 0o100644;
const GIT_EXECUTABLE_MODE: u32 = 0o100755;

/// Owns the scratch directory where working copies live.
#[derive(Debug, Clone)]
pub struct RepositorySnapshotProvider {
    work_dir: PathBuf,
}

impl RepositorySnapshotProvider {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Deterministic, injective working copy location for `uri`.
    pub fn working_copy_path(&self, uri: &str) -> PathBuf {
        let key = bucket_key(uri);
        let readable: String = key
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.work_dir.join(format!("{}-{}", readable, &digest[..12]))
    }

    /// Clone or update the working copy for `uri`.
    ///
    /// Returns `None` when the repository cannot be obtained (missing remote, empty
    /// repository, cancellation); the cause is logged here.
    pub fn download(&self, uri: &str, token: &CancellationToken) -> Option<RepositorySnapshot> {
        let path = self.working_copy_path(uri);

        let result = if path.exists() {
            match pull(&path, token, log_progress) {
                Ok(repo) => {
                    debug!(repository = uri, path = %path.display(), "[SNAPSHOT] Updated working copy");
                    Ok(repo)
                }
                Err(e) if token.is_cancelled() => Err(e),
                Err(e) => {
                    warn!(repository = uri, error = %e, "[SNAPSHOT] Update failed, deleting working copy and cloning again");
                    remove_working_copy(&path);
                    clone(uri, &path, token, log_progress)
                }
            }
        } else {
            clone(uri, &path, token, log_progress)
        };

        let repo = match result {
            Ok(repo) => repo,
            Err(e) => {
                if token.is_cancelled() {
                    warn!(repository = uri, error = %e, "[SNAPSHOT] Download cancelled");
                } else {
                    error!(repository = uri, error = %e, "[SNAPSHOT] Unable to download repository");
                }
                remove_working_copy(&path);
                return None;
            }
        };

        let has_head = repo.head().and_then(|head| head.peel_to_commit()).is_ok();
        if !has_head {
            error!(repository = uri, "[SNAPSHOT] Repository has no HEAD commit");
            drop(repo);
            remove_working_copy(&path);
            return None;
        }

        Some(RepositorySnapshot {
            uri: uri.to_string(),
            path,
            repo,
        })
    }
}

fn log_progress(progress: &Progress<'_>) {
    trace!(
        received = progress.received_objects(),
        total = progress.total_objects(),
        "[SNAPSHOT] Transfer progress"
    );
}

fn fetch_options<'a>(
    token: &'a CancellationToken,
    mut on_progress: impl FnMut(&Progress<'_>) + 'a,
) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    // Returning false aborts the transfer with a git error.
    callbacks.transfer_progress(move |progress| {
        on_progress(&progress);
        !token.is_cancelled()
    });
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn clone<'a>(
    uri: &str,
    path: &Path,
    token: &'a CancellationToken,
    on_progress: impl FnMut(&Progress<'_>) + 'a,
) -> Result<Repository, SnapshotError> {
    if token.is_cancelled() {
        return Err(SnapshotError::Cancelled);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let repo = RepoBuilder::new()
        .fetch_options(fetch_options(token, on_progress))
        .clone(uri, path)?;
    info!(repository = uri, path = %path.display(), "[SNAPSHOT] Cloned repository");
    Ok(repo)
}

fn pull<'a>(
    path: &Path,
    token: &'a CancellationToken,
    on_progress: impl FnMut(&Progress<'_>) + 'a,
) -> Result<Repository, SnapshotError> {
    if token.is_cancelled() {
        return Err(SnapshotError::Cancelled);
    }
    let repo = Repository::open(path)?;
    {
        let branch = current_branch(&repo)?;
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(
            &[branch.as_str()],
            Some(&mut fetch_options(token, on_progress)),
            None,
        )?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let fetched = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&fetched])?;

        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{branch}");
            let mut reference = repo.find_reference(&refname)?;
            reference.set_target(fetched.id(), "fast-forward")?;
            repo.set_head(&refname)?;
            repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        } else if !analysis.is_up_to_date() {
            return Err(SnapshotError::NotFastForward { branch });
        }
    }
    Ok(repo)
}

fn current_branch(repo: &Repository) -> Result<String, SnapshotError> {
    let head = repo.head()?;
    Ok(head.shorthand().unwrap_or("HEAD").to_string())
}

/// Remove a working copy directory. Missing or half-cloned directories are fine.
pub fn remove_working_copy(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "[SNAPSHOT] Removed working copy"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = ?e, "[SNAPSHOT] Failed to remove working copy"),
    }
}

/// A checked-out working copy of one bucket.
pub struct RepositorySnapshot {
    uri: String,
    path: PathBuf,
    repo: Repository,
}

impl RepositorySnapshot {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tracked regular files, in index order. Submodules and symlinks are skipped.
    pub fn files_from_index(&self) -> Result<Vec<String>, SnapshotError> {
        let index = self.repo.index()?;
        Ok(index
            .iter()
            .filter(|entry| entry.mode == GIT_BLOB_MODE || entry.mode == GIT_EXECUTABLE_MODE)
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect())
    }

    /// Content of `path` at HEAD.
    pub fn read_content(&self, path: &str) -> Result<Vec<u8>, SnapshotError> {
        let tree = self.repo.head()?.peel_to_tree()?;
        let entry = tree.get_path(Path::new(path)).map_err(|e| match e.code() {
            ErrorCode::NotFound => SnapshotError::NotFound(path.to_string()),
            _ => SnapshotError::Git(e),
        })?;
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    }

    pub fn branch_name(&self) -> Result<String, SnapshotError> {
        current_branch(&self.repo)
    }

    pub fn commits_cache<F>(
        &self,
        filter: F,
        token: &CancellationToken,
    ) -> Result<CommitsCache, SnapshotError>
    where
        F: Fn(&str) -> bool,
    {
        commit_cache::build_cache(&self.repo, filter, token)
    }

    /// Delete the working copy from disk.
    pub fn delete(self) {
        let RepositorySnapshot { path, repo, .. } = self;
        drop(repo);
        remove_working_copy(&path);
    }
}
