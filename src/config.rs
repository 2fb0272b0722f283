//! Run configuration: CLI flags layered over an optional TOML settings file.
//!
//! Precedence is CLI flag, then settings file, then built-in default. All
//! validation happens here, before anything is scanned.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::policy::{DuplicatePolicy, SearchMode};
use crate::scanner::{ScanFilter, find_missing_root};
use crate::store::ResultStore;

/// Number of groups shown when neither `--top` nor `--all` is given.
pub const DEFAULT_TOP: usize = 3;

/// Name of the settings file looked up in the working directory.
pub const SETTINGS_FILE_NAME: &str = concat!(env!("CARGO_PKG_NAME"), ".toml");

/// Contents of the optional settings file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub fast: bool,
    pub show_all: bool,
    pub top: Option<usize>,
    pub include_hidden: bool,
    pub include_empty: bool,
    pub policy: Option<DuplicatePolicy>,
    pub threads: Option<usize>,
    pub results: Option<PathBuf>,
}

impl Settings {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Loads `explicit` if given, otherwise the settings file in `dir` when
    /// present. Returns the settings and the file they came from.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let path = dir.join(SETTINGS_FILE_NAME);
        if path.is_file() {
            debug!("Using settings from {}", path.display());
            Ok((Self::load(&path)?, Some(path)))
        } else {
            Ok((Self::default(), None))
        }
    }
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub roots: Vec<PathBuf>,
    pub filter: ScanFilter,
    pub policy: DuplicatePolicy,
    pub mode: SearchMode,
    /// Number of groups to display; `None` shows all.
    pub display_limit: Option<usize>,
    pub threads: NonZeroUsize,
    pub results_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub save_results: bool,
    pub from_results: bool,
    pub by_directory: bool,
    pub show_progress: bool,
}

impl RunConfig {
    /// Merges `cli` over `settings`. `settings_path` is only used in error
    /// messages; relative default paths are resolved against `dir`.
    pub fn resolve(
        cli: &Cli,
        settings: Settings,
        settings_path: Option<&Path>,
        dir: &Path,
    ) -> Result<Self, ConfigError> {
        if let Some(top) = settings.top.filter(|&top| settings.show_all && top > 0) {
            return Err(ConfigError::ConflictingDisplayLimit {
                top,
                file: settings_path.map(Path::to_path_buf).unwrap_or_default(),
            });
        }

        let requested = if cli.show_all {
            None
        } else if let Some(top) = cli.top {
            Some(top)
        } else if settings.show_all {
            None
        } else {
            Some(settings.top.unwrap_or(DEFAULT_TOP))
        };
        let display_limit = requested.filter(|&top| top > 0);

        let fast = cli.fast || settings.fast;
        let mode = match (fast, display_limit.and_then(NonZeroUsize::new)) {
            (true, Some(top_k)) => SearchMode::Fast { top_k },
            (true, None) => {
                warn!("Fast mode has no effect when all duplicates are shown; searching exhaustively");
                SearchMode::Exact
            }
            (false, _) => SearchMode::Exact,
        };

        let threads = match cli.threads.or(settings.threads) {
            Some(n) => NonZeroUsize::new(n).ok_or(ConfigError::ZeroThreads)?,
            None => std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        };

        if !cli.from_results {
            if let Some(root) = find_missing_root(&cli.roots) {
                return Err(ConfigError::MissingRoot(root.to_path_buf()));
            }
        }

        let results_path = cli
            .results
            .clone()
            .or(settings.results)
            .unwrap_or_else(|| ResultStore::default_path_in(dir));

        Ok(Self {
            roots: cli.roots.clone(),
            filter: ScanFilter {
                include_hidden: cli.hidden || settings.include_hidden,
                include_empty: cli.empty || settings.include_empty,
            },
            policy: cli.policy.or(settings.policy).unwrap_or_default(),
            mode,
            display_limit,
            threads,
            results_path,
            report_path: cli.report.clone(),
            save_results: !cli.no_save,
            from_results: cli.from_results,
            by_directory: cli.by_directory,
            show_progress: !cli.quiet,
        })
    }
}
