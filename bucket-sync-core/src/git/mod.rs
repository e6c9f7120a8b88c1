//! Local git working copies: clone/update lifecycle and history caching.

pub mod commit_cache;
pub mod snapshot;

pub use commit_cache::{build_cache, CommitsCache};
pub use snapshot::{remove_working_copy, RepositorySnapshot, RepositorySnapshotProvider};
