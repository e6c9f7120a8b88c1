#![doc = "bucket-sync-core: core logic library for bucket-sync."]

//! This crate contains the crawl and reconcile pipeline for package-manifest buckets:
//! discovering bucket repositories, crawling their manifests from local working copies,
//! and keeping a search index in line with what was crawled.
//!
//! # Usage
//! The CLI crate builds a [`synchronise::Pipeline`] from a [`config::SynchroniseConfig`]
//! and runs [`synchronise::synchronise`] against a [`contract::SearchClient`].

pub mod aggregate;
pub mod config;
pub mod contract;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod git;
pub mod index;
pub mod manifest;
pub mod model;
pub mod providers;
pub mod reconcile;
pub mod sources;
pub mod synchronise;
