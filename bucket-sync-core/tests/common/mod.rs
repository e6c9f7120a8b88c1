#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use bucket_sync_core::aggregate::BucketAggregator;
use bucket_sync_core::contract::{BucketsSource, MockBucketsSource};
use bucket_sync_core::crawl::ManifestCrawler;
use bucket_sync_core::fetch::FetchManifestsProcessor;
use bucket_sync_core::git::RepositorySnapshotProvider;
use bucket_sync_core::model::Bucket;
use bucket_sync_core::synchronise::Pipeline;
use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};

/// A throwaway bucket repository on disk.
pub struct TestBucket {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestBucket {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut options = RepositoryInitOptions::new();
        options.initial_head("master");
        let repo = Repository::init_opts(dir.path(), &options).unwrap();
        Self { dir, repo }
    }

    pub fn uri(&self) -> String {
        self.dir.path().to_str().unwrap().to_string()
    }

    /// Write (`Some`) or delete (`None`) files and commit them on top of HEAD.
    pub fn commit(&self, files: &[(&str, Option<&str>)], seconds: i64) -> Oid {
        let workdir = self.repo.workdir().unwrap().to_path_buf();
        let mut index = self.repo.index().unwrap();
        for (path, content) in files {
            let full = workdir.join(path);
            match content {
                Some(content) => {
                    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
                    std::fs::write(&full, content).unwrap();
                    index.add_path(Path::new(path)).unwrap();
                }
                None => {
                    std::fs::remove_file(&full).unwrap();
                    index.remove_path(Path::new(path)).unwrap();
                }
            }
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::new("Tester", "tester@example.org", &Time::new(seconds, 0)).unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, "update", &tree, &parents)
            .unwrap()
    }

    pub fn manifest(version: &str) -> String {
        format!(r#"{{"version": "{version}", "description": "test app", "license": "MIT"}}"#)
    }
}

pub fn source(buckets: Vec<Bucket>) -> Arc<dyn BucketsSource> {
    let mut source = MockBucketsSource::new();
    source.expect_name().return_const("test".to_string());
    source.expect_get_buckets().returning(move |_| buckets.clone());
    Arc::new(source)
}

/// A pipeline over fixed official and non-official bucket lists.
pub fn pipeline(official: Vec<Bucket>, others: Vec<Bucket>, work_dir: &Path) -> Pipeline {
    Pipeline::new(
        BucketAggregator::new(source(official), vec![source(others)], &[]),
        FetchManifestsProcessor::new(ManifestCrawler::new(RepositorySnapshotProvider::new(work_dir))),
        4,
    )
}
