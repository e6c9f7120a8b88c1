///
/// This module implements the CLI interface for bucket-sync: command parsing, config loading
/// and wiring the concrete collaborators into the core pipeline.
///
/// All business logic (sources, crawling, reconciliation) lives in the [`bucket-sync-core`] crate.
/// This module is strictly CLI glue.
///
/// ## Commands
/// - `sync`: run a full cycle against the configured index and print the report as JSON
/// - `crawl`: crawl a single bucket without touching the index, one manifest per line
/// - `buckets`: print the aggregated bucket list
///
/// ## How To Use
/// - For command-line users: use the installed `bucket-sync` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`] and a token.
///
/// [`bucket-sync-core`]: ../../bucket-sync-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use bucket_sync_core::index::{FileIndex, Timed};
use bucket_sync_core::model::{Bucket, BucketInfo};
use bucket_sync_core::synchronise::{synchronise, Pipeline};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// CLI for bucket-sync: discover manifest buckets and keep a search index in sync.
#[derive(Parser)]
#[clap(
    name = "bucket-sync",
    version,
    about = "Discover package-manifest buckets, crawl their manifests and reconcile a search index"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: aggregate buckets, crawl them and reconcile the index
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Crawl one bucket and print its manifests as JSON lines (no index writes)
    Crawl {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Repository URI of the bucket
        #[clap(long)]
        uri: String,
    },
    /// Print the aggregated bucket list as JSON lines
    Buckets {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli, token: CancellationToken) -> Result<()> {
    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", "Starting synchronisation process");
            let pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;
            let index = Timed::new(
                FileIndex::open(&config.index.path)
                    .await
                    .with_context(|| format!("Failed to open index {}", config.index.path.display()))?,
            );
            match synchronise(&pipeline, &index, &token).await {
                Ok(report) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation failed"))
                }
            }
        }
        Commands::Crawl { config, uri } => {
            let config = load_config(config)?;
            tracing::info!(command = "crawl", %uri, "Crawling single bucket");
            let pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;
            let bucket = BucketInfo::new(Bucket::new(uri, 0), false);
            let manifests = pipeline
                .processor()
                .process(&bucket, &token)
                .await
                .with_context(|| format!("Failed to crawl {}", bucket.uri))?;
            for manifest in &manifests {
                println!("{}", serde_json::to_string(manifest)?);
            }
            tracing::info!(command = "crawl", manifests = manifests.len(), "Crawl complete");
            Ok(())
        }
        Commands::Buckets { config } => {
            let config = load_config(config)?;
            let pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;
            let buckets = pipeline.buckets(&token).await;
            for bucket in &buckets {
                println!("{}", serde_json::to_string(bucket)?);
            }
            tracing::info!(command = "buckets", buckets = buckets.len(), "Bucket listing complete");
            Ok(())
        }
    }
}
