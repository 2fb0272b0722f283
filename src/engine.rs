//! Cluster refinement engine.
//!
//! Files start out in a single cluster. Each [`Stage`] computes one key per
//! file, splits every cluster by key and drops groups with fewer than two
//! members. Stages with a retention limit additionally keep only the largest
//! groups, which bounds the work of the more expensive stages that follow at
//! the cost of possibly missing smaller duplicate groups.
//!
//! Within a stage, keys are computed in parallel on a bounded rayon pool;
//! grouping runs on the calling thread.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{FileAccessError, RefineError};
use crate::keys::{Key, KeyExtractor};
use crate::progress::{ProgressSink, SilentProgress, StageProgress};

/// A candidate duplicate group. Always holds at least two paths.
pub type Cluster = Vec<PathBuf>;

/// Approximate number of files whose keys are computed per parallel batch.
const BATCH_FILES: usize = 512;

/// One step of the refinement pipeline.
#[derive(Clone)]
pub struct Stage {
    extractor: Arc<dyn KeyExtractor>,
    label: String,
    retention_limit: Option<NonZeroUsize>,
}

impl Stage {
    pub fn new(extractor: impl KeyExtractor + 'static) -> Self {
        Self::from_arc(Arc::new(extractor))
    }

    pub fn from_arc(extractor: Arc<dyn KeyExtractor>) -> Self {
        Self {
            label: extractor.label().to_string(),
            extractor,
            retention_limit: None,
        }
    }

    /// Keep only the `limit` largest groups produced by this stage.
    #[must_use]
    pub fn with_retention_limit(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.retention_limit = limit;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn retention_limit(&self) -> Option<NonZeroUsize> {
        self.retention_limit
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("label", &self.label)
            .field("retention_limit", &self.retention_limit)
            .finish()
    }
}

/// What happened during one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    pub label: String,
    pub clusters_in: usize,
    pub files_in: usize,
    pub files_inspected: usize,
    pub files_failed: usize,
    /// Groups with at least two members, before truncation.
    pub groups_formed: usize,
    /// Groups carried into the next stage.
    pub groups_retained: usize,
}

/// Outcome of a completed refinement run.
#[derive(Debug, Default)]
pub struct Refinement {
    pub clusters: Vec<Cluster>,
    /// Files dropped because their key could not be computed.
    pub failures: Vec<FileAccessError>,
    pub stages: Vec<StageStats>,
}

impl Refinement {
    /// True when a retention limit discarded at least one group.
    pub fn truncated(&self) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.groups_retained < stage.groups_formed)
    }

    pub fn duplicate_file_count(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }
}

/// Drives a list of stages over a set of files.
pub struct Refiner {
    pool: rayon::ThreadPool,
    progress: Arc<dyn ProgressSink>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Refiner {
    /// Creates a refiner whose key computations use `threads` worker threads.
    pub fn new(threads: NonZeroUsize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(|i| format!("key-worker-{i}"))
            .build()?;
        Ok(Self {
            pool,
            progress: Arc::new(SilentProgress),
            cancel_flag: None,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Runs every stage in order and returns the clusters that survived all
    /// of them.
    ///
    /// Files whose key cannot be computed are dropped and listed in
    /// [`Refinement::failures`]; the run itself only fails on cancellation or
    /// on an unrecoverable error.
    pub fn refine(&self, files: Vec<PathBuf>, stages: &[Stage]) -> Result<Refinement, RefineError> {
        let mut refinement = Refinement::default();
        let mut clusters = if files.len() >= 2 { vec![files] } else { Vec::new() };

        for stage in stages {
            if self.is_cancelled() {
                return Err(RefineError::Interrupted);
            }
            let (next, stats) = self.run_stage(stage, clusters, &mut refinement.failures)?;
            info!(
                "{}: {} of {} files formed {} groups, {} kept",
                stats.label, stats.files_inspected, stats.files_in, stats.groups_formed, stats.groups_retained
            );
            refinement.stages.push(stats);
            clusters = next;
        }

        refinement.clusters = clusters;
        Ok(refinement)
    }

    fn run_stage(
        &self,
        stage: &Stage,
        clusters: Vec<Cluster>,
        failures: &mut Vec<FileAccessError>,
    ) -> Result<(Vec<Cluster>, StageStats), RefineError> {
        let mut stats = StageStats {
            label: stage.label.clone(),
            clusters_in: clusters.len(),
            files_in: clusters.iter().map(Vec::len).sum(),
            ..StageStats::default()
        };
        self.progress.stage_started(&stage.label, stats.files_in);

        let mut tally = StageProgress::new(stage.label.clone());
        let mut next: Vec<Cluster> = Vec::new();

        for batch in into_batches(clusters, BATCH_FILES) {
            if self.is_cancelled() {
                return Err(RefineError::Interrupted);
            }
            let keys = self.compute_keys(stage.extractor.as_ref(), &batch);

            for (cluster, cluster_keys) in batch.into_iter().zip(keys) {
                let mut groups: IndexMap<Key, Cluster> = IndexMap::new();

                for (path, key) in cluster.into_iter().zip(cluster_keys) {
                    let key = match key {
                        Some(Ok(key)) => key,
                        Some(Err(err)) if err.is_recoverable() => {
                            warn!("Skipping file: {err}");
                            stats.files_failed += 1;
                            failures.push(err);
                            continue;
                        }
                        Some(Err(err)) => return Err(RefineError::Fatal(err)),
                        None => return Err(RefineError::Interrupted),
                    };
                    let members = groups.entry(key).or_default();
                    members.push(path);
                    tally.record(members.len());
                    self.progress.update(&tally, false);
                }

                next.extend(groups.into_values().filter(|group| group.len() >= 2));
            }
        }

        self.progress.update(&tally, true);
        self.progress.stage_finished(&tally);

        // Stable: equal-sized groups keep first-seen order.
        next.sort_by(|a, b| b.len().cmp(&a.len()));
        stats.files_inspected = tally.files_inspected;
        stats.groups_formed = next.len();
        if let Some(limit) = stage.retention_limit {
            if next.len() > limit.get() {
                debug!(
                    "{}: keeping the {} largest of {} groups",
                    stage.label,
                    limit,
                    next.len()
                );
                next.truncate(limit.get());
            }
        }
        stats.groups_retained = next.len();

        Ok((next, stats))
    }

    /// Computes keys for every file of a batch, in input order.
    ///
    /// `None` marks a file skipped because cancellation was requested.
    fn compute_keys(
        &self,
        extractor: &dyn KeyExtractor,
        batch: &[Cluster],
    ) -> Vec<Vec<Option<Result<Key, FileAccessError>>>> {
        self.pool.install(|| {
            batch
                .par_iter()
                .map(|cluster| {
                    cluster
                        .par_iter()
                        .map(|path| self.extract(extractor, path))
                        .collect::<Vec<_>>()
                })
                .collect()
        })
    }

    fn extract(&self, extractor: &dyn KeyExtractor, path: &Path) -> Option<Result<Key, FileAccessError>> {
        if self.is_cancelled() {
            return None;
        }
        Some(extractor.extract(path))
    }
}

/// Splits clusters into batches of roughly `max_files` files without
/// splitting any cluster.
fn into_batches(clusters: Vec<Cluster>, max_files: usize) -> Vec<Vec<Cluster>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut files = 0;

    for cluster in clusters {
        files += cluster.len();
        current.push(cluster);
        if files >= max_files {
            batches.push(std::mem::take(&mut current));
            files = 0;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
