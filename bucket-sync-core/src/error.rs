//! Error taxonomy for the crawl → reconcile pipeline.
//!
//! Each boundary owns one enum. Callers decide recovery by variant:
//! snapshot and provider errors are recovered per bucket or per candidate,
//! manifest errors per file, and index errors abort the run.

use thiserror::Error;

/// Failures while cloning, updating or reading a local working copy.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found in snapshot: {0}")]
    NotFound(String),

    #[error("merge of {branch} is not a fast-forward")]
    NotFastForward { branch: String },

    #[error("operation cancelled")]
    Cancelled,
}

/// Failures that terminate the crawl of a whole bucket.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("crawl cancelled for {0}")]
    Cancelled(String),

    #[error("crawl worker failed: {0}")]
    Worker(String),
}

/// A single manifest file could not be parsed.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest is not valid utf-8")]
    Encoding,

    #[error("manifest is not a json object")]
    NotAnObject,

    #[error("manifest path has no file name: {0}")]
    InvalidPath(String),
}

/// Failures talking to a git hosting API or fetching a bucket list.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("uri is not a repository on this host: {0}")]
    InvalidUri(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Failures reading or writing the search index. Always fatal for the run.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index backend error: {0}")]
    Backend(String),
}
