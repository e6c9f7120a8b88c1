//! One-pass file → commit history cache.
//!
//! Walks first-parent history from HEAD once, diffing each commit against its first parent,
//! and appends the commit to every touched path. Lists therefore come out most-recent-first.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{Commit, Repository, Sort};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SnapshotError;
use crate::model::CommitInfo;

/// File path → commits that touched it, most recent first.
pub type CommitsCache = HashMap<String, Vec<CommitInfo>>;

/// Build the cache for every path accepted by `filter`.
///
/// Cancellation is checked between commits; a cancelled walk returns the partial cache,
/// which is only trustworthy when the caller also sees the token cancelled.
pub fn build_cache<F>(
    repo: &Repository,
    filter: F,
    token: &CancellationToken,
) -> Result<CommitsCache, SnapshotError>
where
    F: Fn(&str) -> bool,
{
    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;
    revwalk.simplify_first_parent()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL)?;

    let mut cache = CommitsCache::new();
    let mut walked = 0usize;

    for oid in revwalk {
        if token.is_cancelled() {
            warn!(walked, "[COMMITS] Cancelled, returning partial commits cache");
            break;
        }
        let commit = repo.find_commit(oid?)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let info = commit_info(&commit);
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .and_then(|p| p.to_str());
            if let Some(path) = path.filter(|p| filter(p)) {
                cache.entry(path.to_string()).or_default().push(info.clone());
            }
        }
        walked += 1;
    }

    debug!(walked, files = cache.len(), "[COMMITS] Commits cache built");
    Ok(cache)
}

fn commit_info(commit: &Commit<'_>) -> CommitInfo {
    let author = commit.author();
    CommitInfo {
        author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
        author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
        date: commit_date(commit),
        sha: commit.id().to_string(),
    }
}

fn commit_date(commit: &Commit<'_>) -> DateTime<FixedOffset> {
    let time = commit.time();
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .unwrap_or_default()
        .with_timezone(&offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{commit_files, init_repo, signature, stage_files};

    fn shas(cache: &CommitsCache, path: &str) -> Vec<String> {
        cache
            .get(path)
            .map(|commits| commits.iter().map(|c| c.sha.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn lists_are_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let c1 = commit_files(&repo, &[("a.json", Some("1")), ("b.txt", Some("x"))], 1_000);
        let c2 = commit_files(&repo, &[("a.json", Some("2"))], 2_000);
        let c3 = commit_files(&repo, &[("c.json", Some("3"))], 3_000);

        let cache = build_cache(&repo, |_| true, &CancellationToken::new()).unwrap();

        assert_eq!(shas(&cache, "a.json"), vec![c2.to_string(), c1.to_string()]);
        assert_eq!(shas(&cache, "b.txt"), vec![c1.to_string()]);
        assert_eq!(shas(&cache, "c.json"), vec![c3.to_string()]);

        let latest = &cache["a.json"][0];
        assert_eq!(latest.author_name, "Tester");
        assert_eq!(latest.author_email, "tester@example.org");
        assert_eq!(latest.date.timestamp(), 2_000);
    }

    #[test]
    fn filter_excludes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.json", Some("1")), ("b.txt", Some("x"))], 1_000);

        let cache = build_cache(&repo, |p| p.ends_with(".json"), &CancellationToken::new()).unwrap();

        assert!(cache.contains_key("a.json"));
        assert!(!cache.contains_key("b.txt"));
    }

    #[test]
    fn follows_first_parent_only() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let c1 = commit_files(&repo, &[("a.json", Some("1"))], 1_000);
        let base = repo.find_commit(c1).unwrap();

        let tree = repo.find_tree(stage_files(&repo, &[("a.json", Some("2"))])).unwrap();
        let sig = signature(2_000);
        let side = repo.commit(None, &sig, &sig, "side", &tree, &[&base]).unwrap();
        let side_commit = repo.find_commit(side).unwrap();
        let sig = signature(3_000);
        let merge = repo
            .commit(Some("HEAD"), &sig, &sig, "merge", &tree, &[&base, &side_commit])
            .unwrap();

        let cache = build_cache(&repo, |_| true, &CancellationToken::new()).unwrap();

        assert_eq!(shas(&cache, "a.json"), vec![merge.to_string(), c1.to_string()]);
    }

    #[test]
    fn deleted_files_are_recorded_against_the_deleting_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let c1 = commit_files(&repo, &[("a.json", Some("1")), ("b.json", Some("1"))], 1_000);
        let c2 = commit_files(&repo, &[("b.json", None)], 2_000);

        let cache = build_cache(&repo, |_| true, &CancellationToken::new()).unwrap();

        assert_eq!(shas(&cache, "b.json"), vec![c2.to_string(), c1.to_string()]);
    }

    #[test]
    fn cancelled_token_returns_partial_cache() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.json", Some("1"))], 1_000);

        let token = CancellationToken::new();
        token.cancel();
        let cache = build_cache(&repo, |_| true, &token).unwrap();

        assert!(cache.is_empty());
    }
}
