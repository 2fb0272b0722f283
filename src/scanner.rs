use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{HumanCount, ProgressBar};
use log::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::RefineError;

/// File names that never take part in a duplicate search.
pub const IGNORED_FILE_NAMES: &[&str] = &["Thumbs.db", "desktop.ini", ".DS_Store"];

/// Directories whose name contains this marker are recycle bins and skipped.
pub const RECYCLE_BIN_MARKER: &str = "RECYCLE.BIN";

/// Which files the enumerator yields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Include files and directories whose name starts with a dot.
    pub include_hidden: bool,
    /// Include zero-byte files.
    pub include_empty: bool,
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn is_recycle_bin(name: &OsStr) -> bool {
    name.to_string_lossy().contains(RECYCLE_BIN_MARKER)
}

/// Checks the components of a root itself, so that a root inside a hidden
/// directory or a recycle bin is excluded like any entry below it.
fn root_excluded(root: &Path, filter: ScanFilter) -> bool {
    root.components().any(|component| match component {
        Component::Normal(name) => {
            is_recycle_bin(name) || (!filter.include_hidden && is_hidden(name))
        }
        _ => false,
    })
}

/// Decides whether to descend into (or yield) an entry below a root.
fn keep_entry(entry: &DirEntry, filter: ScanFilter) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name();
    if !filter.include_hidden && is_hidden(name) {
        return false;
    }
    !(entry.file_type().is_dir() && is_recycle_bin(name))
}

fn accept_file(entry: &DirEntry, filter: ScanFilter) -> bool {
    if !entry.file_type().is_file() {
        // Symlinks are reported as such because links are not followed.
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if IGNORED_FILE_NAMES.iter().any(|ignored| *ignored == name) {
        debug!("Ignoring '{}'", entry.path().display());
        return false;
    }
    if filter.include_empty {
        return true;
    }
    match entry.metadata() {
        Ok(metadata) => metadata.len() > 0,
        Err(e) => {
            warn!("Failed to read metadata for '{}': {}", entry.path().display(), e);
            false
        }
    }
}

/// Resolves every root to its canonical path. Roots that cannot be resolved
/// or that sit inside an excluded directory are dropped.
fn canonical_roots(roots: &[PathBuf], filter: ScanFilter) -> Vec<PathBuf> {
    roots
        .iter()
        .filter_map(|root| match fs::canonicalize(root) {
            Ok(canonical) => Some(canonical),
            Err(e) => {
                warn!("Skipping root '{}': {}", root.display(), e);
                None
            }
        })
        .filter(|root| {
            let excluded = root_excluded(root, filter);
            if excluded {
                info!("Skipping '{}': hidden or recycle bin directory", root.display());
            }
            !excluded
        })
        .collect()
}

/// Lazily walks `roots` and yields the canonical path of every file that
/// passes `filter`.
///
/// Roots are canonicalized first, so the same directory reached through
/// `..` or a symlinked root yields the same paths. Symbolic links below a
/// root are never followed or yielded.
pub fn enumerate(roots: &[PathBuf], filter: ScanFilter) -> impl Iterator<Item = PathBuf> + use<> {
    canonical_roots(roots, filter).into_iter().flat_map(move |root| {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| keep_entry(entry, filter))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    None
                }
            })
            .filter(move |entry| accept_file(entry, filter))
            .map(DirEntry::into_path)
    })
}

/// Drains [`enumerate`] into a list, dropping paths reached through more
/// than one root.
pub fn collect_files(roots: &[PathBuf], filter: ScanFilter, show_spinner: bool) -> Vec<PathBuf> {
    let never = AtomicBool::new(false);
    collect_files_until(roots, filter, show_spinner, &never).unwrap_or_default()
}

/// Like [`collect_files`], but stops with [`RefineError::Interrupted`] as
/// soon as `cancel` is raised.
pub fn collect_files_until(
    roots: &[PathBuf],
    filter: ScanFilter,
    show_spinner: bool,
    cancel: &AtomicBool,
) -> Result<Vec<PathBuf>, RefineError> {
    for root in roots {
        info!("Scanning {}", root.display());
    }

    let pb = if show_spinner {
        let pb = ProgressBar::new_spinner();
        pb.set_message("Scanning files and directories...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::new();
    for path in enumerate(roots, filter) {
        if cancel.load(Ordering::SeqCst) {
            pb.finish_and_clear();
            return Err(RefineError::Interrupted);
        }
        pb.tick();
        if seen.insert(path.clone()) {
            files.push(path);
        } else {
            debug!("Already enumerated '{}'", path.display());
        }
    }
    pb.finish_and_clear();

    info!("Found {} candidate files", HumanCount(files.len() as u64));
    Ok(files)
}

/// Returns the first root that is not an existing directory.
pub fn find_missing_root(roots: &[PathBuf]) -> Option<&Path> {
    roots
        .iter()
        .map(PathBuf::as_path)
        .find(|root| !root.is_dir())
}
