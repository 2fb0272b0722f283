use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{HumanBytes, ProgressBar};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use zstd::stream::{Encoder, decode_all};

use crate::policy::DuplicatePolicy;
use crate::report::DuplicateSet;

/// Version of the persisted result format.
pub const REPORT_VERSION: u32 = 1;

/// Results of one run, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub version: u32,
    /// RFC 3339 timestamp of the run.
    pub created_at: String,
    pub roots: Vec<PathBuf>,
    pub policy: DuplicatePolicy,
    /// Whether the run may have omitted duplicate groups.
    pub approximate: bool,
    pub groups: Vec<DuplicateSet>,
}

impl StoredReport {
    pub fn new(
        roots: Vec<PathBuf>,
        policy: DuplicatePolicy,
        approximate: bool,
        groups: Vec<DuplicateSet>,
    ) -> Self {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            version: REPORT_VERSION,
            created_at,
            roots,
            policy,
            approximate,
            groups,
        }
    }
}

/// Location of the persisted results of the last run.
///
/// The file is zstd-compressed JSON and is overwritten by every run.
pub struct ResultStore {
    pub path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path_in(dir: &Path) -> PathBuf {
        dir.join(format!("{}-results.json.zst", env!("CARGO_PKG_NAME")))
    }

    /// Serializes `report` to JSON, compresses it with zstd and replaces the
    /// store file. Compression uses every available core.
    pub fn save(&self, report: &StoredReport, show_progress: bool) -> Result<()> {
        info!("Saving results to {}", self.path.display());
        let spinner = if show_progress {
            let spinner = ProgressBar::new_spinner();
            spinner.set_message("Saving results...");
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        } else {
            ProgressBar::hidden()
        };

        let content = serde_json::to_vec(report).context("Failed to serialize results")?;
        let file = fs::File::create(&self.path)
            .with_context(|| format!("Failed to create '{}'", self.path.display()))?;
        let mut encoder = Encoder::new(file, 9)?;
        let workers = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        if workers > 1
            && let Err(e) = encoder.multithread(u32::try_from(workers).unwrap_or(u32::MAX))
        {
            debug!("zstd workers unavailable, compressing on one thread: {e}");
        }
        encoder.write_all(&content)?;
        encoder.finish()?;

        spinner.finish_and_clear();
        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        info!("Results compressed size: {}", HumanBytes(size));
        Ok(())
    }

    /// Reads back the results of a previous run.
    pub fn load(&self) -> Result<StoredReport> {
        let compressed = fs::read(&self.path)
            .with_context(|| format!("Failed to read results from '{}'", self.path.display()))?;
        info!(
            "Loading results from: {} ({})",
            self.path.display(),
            HumanBytes(compressed.len() as u64)
        );
        let decoded = decode_all(&compressed[..])
            .with_context(|| format!("Failed to decompress '{}'", self.path.display()))?;
        let report: StoredReport = serde_json::from_slice(&decoded)
            .with_context(|| format!("Failed to parse results in '{}'", self.path.display()))?;

        if report.version != REPORT_VERSION {
            bail!(
                "Unsupported results version: {}. Current version is {}.",
                report.version,
                REPORT_VERSION
            );
        }
        Ok(report)
    }
}
