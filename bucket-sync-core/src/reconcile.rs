//! Reconcile the search index with a fresh crawl.
//!
//! Two notions of equality drive the diff (see [`ManifestComparison`]): Id-equality answers
//! whether a manifest slot still exists, exact-equality whether anything an index consumer
//! cares about changed. The diff itself is the pure [`plan`]; [`reconcile`] reads the index,
//! plans and writes.
//!
//! Per-manifest deletes only touch repositories that were crawled successfully this cycle.
//! A bucket that failed or was cancelled keeps its documents until it either crawls again
//! or leaves the aggregated bucket set, at which point the coarse whole-bucket delete
//! removes it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::SearchClient;
use crate::error::IndexError;
use crate::model::{bucket_key, ManifestInfo, ManifestPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestComparison {
    /// Same slot: equal Id.
    Id,
    /// Unchanged for index consumers: equal Id, Sha, stars, official number and DuplicateOf.
    Exact,
}

impl ManifestComparison {
    pub fn equals(self, a: &ManifestInfo, b: &ManifestInfo) -> bool {
        match self {
            ManifestComparison::Id => a.id == b.id,
            ManifestComparison::Exact => {
                a.id == b.id
                    && a.metadata.sha == b.metadata.sha
                    && a.metadata.repository_stars == b.metadata.repository_stars
                    && a.metadata.official_repository_number == b.metadata.official_repository_number
                    && a.metadata.duplicate_of == b.metadata.duplicate_of
            }
        }
    }
}

/// Elements of `left` with no equal element in `right` under `comparison`, in `left` order.
pub fn difference(
    left: &[ManifestInfo],
    right: &[ManifestInfo],
    comparison: ManifestComparison,
) -> Vec<ManifestInfo> {
    // Both comparison modes imply Id equality, so an Id lookup finds the only candidate.
    let by_id: HashMap<&str, &ManifestInfo> = right.iter().map(|m| (m.id.as_str(), m)).collect();
    left.iter()
        .filter(|l| {
            !by_id
                .get(l.id.as_str())
                .is_some_and(|r| comparison.equals(l, r))
        })
        .cloned()
        .collect()
}

/// Tag cross-repository mirrors with `DuplicateOf`.
///
/// Manifests sharing a content hash form a group when they span more than one repository.
/// The original is the most official member, then the earliest committed, then the first
/// in input order. Every other member points at it.
pub fn tag_duplicates(manifests: Vec<ManifestInfo>) -> Vec<ManifestInfo> {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (position, manifest) in manifests.iter().enumerate() {
        if !manifest.metadata.manifest_hash.is_empty() {
            groups
                .entry(manifest.metadata.manifest_hash.as_str())
                .or_default()
                .push(position);
        }
    }

    let mut originals: HashMap<usize, String> = HashMap::new();
    for members in groups.values().filter(|members| members.len() > 1) {
        let repositories: HashSet<String> = members
            .iter()
            .map(|&i| bucket_key(&manifests[i].metadata.repository))
            .collect();
        if repositories.len() < 2 {
            continue;
        }
        let Some(&original) = members.iter().min_by(|&&a, &&b| {
            let (a, b) = (&manifests[a].metadata, &manifests[b].metadata);
            b.official_repository_number
                .cmp(&a.official_repository_number)
                .then(a.committed.cmp(&b.committed))
        }) else {
            continue;
        };
        for &member in members.iter().filter(|&&m| m != original) {
            originals.insert(member, manifests[original].id.clone());
        }
    }

    debug!(duplicates = originals.len(), "[RECONCILE] Tagged duplicates");
    manifests
        .into_iter()
        .enumerate()
        .map(|(position, manifest)| match originals.remove(&position) {
            Some(original_id) => manifest.mark_duplicate_of(original_id),
            None => manifest,
        })
        .collect()
}

/// Writes needed to bring the index in line with a crawl.
#[derive(Debug, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_delete: Vec<ManifestInfo>,
    pub to_add: Vec<ManifestInfo>,
    /// Changed documents that need a full rewrite.
    pub to_update: Vec<ManifestInfo>,
    /// Documents whose only change is `DuplicateOf`.
    pub to_patch: Vec<ManifestPatch>,
}

/// Diff `crawled` (already duplicate-tagged) against `indexed`.
///
/// `crawled_repositories` holds the bucket keys that were crawled successfully; indexed
/// documents of any other repository are never deleted here.
pub fn plan(
    indexed: &[ManifestInfo],
    crawled: &[ManifestInfo],
    crawled_repositories: &HashSet<String>,
) -> ReconcilePlan {
    let deletable: Vec<ManifestInfo> = indexed
        .iter()
        .filter(|m| crawled_repositories.contains(&bucket_key(&m.metadata.repository)))
        .cloned()
        .collect();
    let to_delete = difference(&deletable, crawled, ManifestComparison::Id);
    let to_add = difference(crawled, indexed, ManifestComparison::Id);

    let existing = difference(crawled, &to_add, ManifestComparison::Id);
    let changed = difference(&existing, indexed, ManifestComparison::Exact);

    let indexed_by_id: HashMap<&str, &ManifestInfo> =
        indexed.iter().map(|m| (m.id.as_str(), m)).collect();
    let (patched, to_update): (Vec<ManifestInfo>, Vec<ManifestInfo>) =
        changed.into_iter().partition(|m| {
            indexed_by_id
                .get(m.id.as_str())
                .is_some_and(|previous| only_duplicate_changed(m, previous))
        });

    ReconcilePlan {
        to_delete,
        to_add,
        to_update,
        to_patch: patched.iter().map(ManifestInfo::duplicate_patch).collect(),
    }
}

fn only_duplicate_changed(current: &ManifestInfo, previous: &ManifestInfo) -> bool {
    let (current, previous) = (&current.metadata, &previous.metadata);
    current.duplicate_of != previous.duplicate_of
        && current.sha == previous.sha
        && current.repository_stars == previous.repository_stars
        && current.official_repository_number == previous.official_repository_number
}

/// Which buckets a reconciliation covers.
#[derive(Debug, Clone, Default)]
pub struct ReconcileScope {
    /// Every aggregated bucket URI, crawled or not.
    pub buckets: Vec<String>,
    /// Bucket URIs whose crawl completed.
    pub crawled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub added: usize,
    pub updated: usize,
    pub patched: usize,
}

/// Bring the index in line with `crawled`.
///
/// Order: delete documents of buckets that left the aggregated set, then diff the rest
/// per manifest and write deletes, upserts and patches. Any index failure aborts.
///
/// An empty aggregated set never clears the index.
pub async fn reconcile(
    search: &dyn SearchClient,
    crawled: Vec<ManifestInfo>,
    scope: &ReconcileScope,
    token: &CancellationToken,
) -> Result<ReconcileReport, IndexError> {
    let buckets: HashSet<String> = scope.buckets.iter().map(|b| bucket_key(b)).collect();
    let crawled_repositories: HashSet<String> = scope.crawled.iter().map(|b| bucket_key(b)).collect();

    let vanished: Vec<String> = search
        .get_all_bucket_uris(token)
        .await?
        .into_iter()
        .filter(|uri| !buckets.contains(&bucket_key(uri)))
        .collect();
    let mut vanished_count = 0;
    if buckets.is_empty() && !vanished.is_empty() {
        warn!(
            indexed_buckets = vanished.len(),
            "[RECONCILE] No buckets aggregated, keeping every indexed bucket"
        );
    } else if !vanished.is_empty() {
        let stale = search.get_manifests_for_repositories(vanished.clone(), token).await?;
        vanished_count = stale.len();
        info!(buckets = vanished.len(), manifests = vanished_count, "[RECONCILE] Deleting manifests of vanished buckets");
        search.delete_manifests(stale, token).await?;
    }

    let indexed: Vec<ManifestInfo> = search
        .get_all_manifests(token)
        .await?
        .into_iter()
        .filter(|m| buckets.contains(&bucket_key(&m.metadata.repository)))
        .collect();
    let crawled = tag_duplicates(crawled);
    let plan = plan(&indexed, &crawled, &crawled_repositories);

    let report = ReconcileReport {
        deleted: vanished_count + plan.to_delete.len(),
        added: plan.to_add.len(),
        updated: plan.to_update.len(),
        patched: plan.to_patch.len(),
    };
    info!(
        indexed = indexed.len(),
        crawled = crawled.len(),
        delete = plan.to_delete.len(),
        add = report.added,
        update = report.updated,
        patch = report.patched,
        "[RECONCILE] Planned index changes"
    );

    if !plan.to_delete.is_empty() {
        search.delete_manifests(plan.to_delete, token).await?;
    }
    let upserts: Vec<ManifestInfo> = plan.to_add.into_iter().chain(plan.to_update).collect();
    if !upserts.is_empty() {
        search.upsert_manifests(upserts, token).await?;
    }
    if !plan.to_patch.is_empty() {
        search.patch_manifests(plan.to_patch, token).await?;
    }

    Ok(report)
}
