//! Ranking and formatting of final duplicate sets.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;
use indicatif::HumanBytes;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::engine::Cluster;

/// A group of files that survived every stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSet {
    /// Size in bytes of the representative (first) member.
    pub size: u64,
    pub files: Vec<PathBuf>,
}

impl DuplicateSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Sorts sets by member count, then by file size, both descending.
pub fn sort_sets(sets: &mut [DuplicateSet]) {
    sets.sort_by(|a, b| (b.len(), b.size).cmp(&(a.len(), a.size)));
}

/// Turns refined clusters into ranked duplicate sets.
pub fn rank(clusters: Vec<Cluster>) -> Vec<DuplicateSet> {
    let mut sets: Vec<DuplicateSet> = clusters
        .into_iter()
        .filter(|files| !files.is_empty())
        .map(|files| {
            let size = match fs::metadata(&files[0]) {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!("Failed to read size of '{}': {}", files[0].display(), e);
                    0
                }
            };
            DuplicateSet { size, files }
        })
        .collect();
    sort_sets(&mut sets);
    sets
}

/// Deepest directory that contains every path.
pub fn common_prefix<'a, I>(paths: I) -> PathBuf
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut paths = paths.into_iter();
    let Some(first) = paths.next() else {
        return PathBuf::new();
    };
    let mut prefix: PathBuf = first.parent().map(Path::to_path_buf).unwrap_or_default();
    for path in paths {
        while !path.starts_with(&prefix) {
            if !prefix.pop() {
                return PathBuf::new();
            }
        }
    }
    prefix
}

pub fn total_files(sets: &[DuplicateSet]) -> usize {
    sets.iter().map(DuplicateSet::len).sum()
}

/// One-line result count. Approximate runs say that more groups may exist.
pub fn summary(sets: &[DuplicateSet], approximate: bool) -> String {
    if approximate {
        format!(
            "Found {} duplicates at least ({} duplicate files total) -- More duplicates may exist.",
            sets.len(),
            total_files(sets)
        )
    } else {
        format!(
            "Found {} duplicates ({} duplicate files total)",
            sets.len(),
            total_files(sets)
        )
    }
}

/// Directory display with exactly one trailing separator.
fn display_dir(dir: &Path) -> String {
    let shown = dir.display().to_string();
    if shown.is_empty() || shown.ends_with(std::path::MAIN_SEPARATOR) {
        shown
    } else {
        format!("{shown}{}", std::path::MAIN_SEPARATOR)
    }
}

fn relative<'a>(path: &'a Path, prefix: &Path) -> &'a Path {
    path.strip_prefix(prefix).unwrap_or(path)
}

/// Writes the first `limit` sets (all of them when `limit` is `None`).
pub fn render<W: Write>(
    sets: &[DuplicateSet],
    limit: Option<usize>,
    color: bool,
    out: &mut W,
) -> io::Result<()> {
    let shown = limit.map_or(sets.len(), |limit| limit.min(sets.len()));
    for (pos, set) in sets[..shown].iter().enumerate() {
        let prefix = common_prefix(&set.files);
        let heading = format!(
            "({}) Found {} duplicate files (size: {}) in {}:",
            pos + 1,
            set.len(),
            HumanBytes(set.size),
            display_dir(&prefix)
        );
        writeln!(out)?;
        if color {
            writeln!(out, "{}", heading.yellow().bold())?;
        } else {
            writeln!(out, "{heading}")?;
        }

        let mut files: Vec<&PathBuf> = set.files.iter().collect();
        files.sort();
        for (i, file) in files.into_iter().enumerate() {
            writeln!(out, "{:>2}: {}", i + 1, relative(file, &prefix).display())?;
        }
    }
    Ok(())
}

/// Duplicate sets whose members live in the same directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    /// Sorted parent directories, one entry per member file.
    pub directories: Vec<PathBuf>,
    pub sets: Vec<DuplicateSet>,
}

/// Groups sets by the directories their members are in, so that whole
/// directories copied to another place show up as one entry.
///
/// Groups are ordered by the number of sets they hold, descending; ties are
/// ordered by their sorted directory lists.
pub fn group_by_directories(sets: &[DuplicateSet]) -> Vec<DirectoryGroup> {
    let mut groups: HashMap<Vec<PathBuf>, Vec<DuplicateSet>> = HashMap::new();

    for set in sets {
        let mut directories: Vec<PathBuf> = set
            .files
            .iter()
            .map(|file| file.parent().map(Path::to_path_buf).unwrap_or_default())
            .collect();
        directories.sort();
        groups.entry(directories).or_default().push(set.clone());
    }

    let mut result: Vec<DirectoryGroup> = groups
        .into_iter()
        .map(|(directories, sets)| DirectoryGroup { directories, sets })
        .collect();
    result.sort_by(|a, b| {
        b.sets
            .len()
            .cmp(&a.sets.len())
            .then_with(|| a.directories.cmp(&b.directories))
    });
    result
}

pub fn render_directory_groups<W: Write>(
    groups: &[DirectoryGroup],
    limit: Option<usize>,
    color: bool,
    out: &mut W,
) -> io::Result<()> {
    let shown = limit.map_or(groups.len(), |limit| limit.min(groups.len()));
    for (pos, group) in groups[..shown].iter().enumerate() {
        let prefix = common_prefix(&group.directories);
        let bytes: u64 = group.sets.iter().map(|set| set.size).sum();
        let heading = format!(
            "({}) {} duplicate sets ({} each copy) shared by {} directories in {}:",
            pos + 1,
            group.sets.len(),
            HumanBytes(bytes),
            group.directories.len(),
            display_dir(&prefix)
        );
        writeln!(out)?;
        if color {
            writeln!(out, "{}", heading.yellow().bold())?;
        } else {
            writeln!(out, "{heading}")?;
        }
        for (i, directory) in group.directories.iter().enumerate() {
            writeln!(out, "{:>2}: {}", i + 1, display_dir(relative(directory, &prefix)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(size: u64, files: &[&str]) -> DuplicateSet {
        DuplicateSet {
            size,
            files: files.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn ranks_by_count_then_size() {
        let mut sets = vec![
            set(10, &["/a/1", "/a/2"]),
            set(5, &["/b/1", "/b/2", "/b/3"]),
            set(99, &["/c/1", "/c/2"]),
        ];
        sort_sets(&mut sets);
        let sizes: Vec<u64> = sets.iter().map(|s| s.size).collect();
        assert_eq!(sizes, vec![5, 99, 10]);
    }

    #[test]
    fn common_prefix_is_deepest_shared_directory() {
        let paths = vec![
            PathBuf::from("/home/u/photos/2020/a.jpg"),
            PathBuf::from("/home/u/photos/backup/a.jpg"),
        ];
        assert_eq!(common_prefix(&paths), PathBuf::from("/home/u/photos"));

        let same_dir = vec![PathBuf::from("/x/y/a"), PathBuf::from("/x/y/b")];
        assert_eq!(common_prefix(&same_dir), PathBuf::from("/x/y"));

        // Component-wise, not character-wise.
        let similar = vec![PathBuf::from("/data/abc/f"), PathBuf::from("/data/abd/f")];
        assert_eq!(common_prefix(&similar), PathBuf::from("/data"));
    }

    #[test]
    fn summary_marks_approximate_results() {
        let sets = vec![set(3, &["/a", "/b", "/c"]), set(3, &["/d", "/e"])];
        assert_eq!(summary(&sets, false), "Found 2 duplicates (5 duplicate files total)");
        assert_eq!(
            summary(&sets, true),
            "Found 2 duplicates at least (5 duplicate files total) -- More duplicates may exist."
        );
    }

    #[test]
    fn render_strips_prefix_and_respects_limit() {
        let sets = vec![
            set(3, &["/data/x/b.txt", "/data/y/a.txt", "/data/x/a.txt"]),
            set(3, &["/data/z/c.txt", "/data/z/d.txt"]),
        ];
        let mut out = Vec::new();
        render(&sets, Some(1), false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\n(1) Found 3 duplicate files (size: 3 B) in /data/:\n 1: x/a.txt\n 2: x/b.txt\n 3: y/a.txt\n"
        );

        let mut out = Vec::new();
        render(&sets, None, false, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("(2) Found 2 duplicate files"));
    }

    #[test]
    fn directory_groups_collect_sets_in_same_folders() {
        let sets = vec![
            set(1, &["/src/a", "/copy/a"]),
            set(2, &["/other/x", "/misc/x"]),
            set(3, &["/copy/b", "/src/b"]),
        ];
        let groups = group_by_directories(&sets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].sets.len(), 2);
        assert_eq!(
            groups[0].directories,
            vec![PathBuf::from("/copy"), PathBuf::from("/src")]
        );

        let mut out = Vec::new();
        render_directory_groups(&groups, None, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(" 1: copy/\n 2: src/\n"));
        assert!(text.contains("(1) 2 duplicate sets (4 B each copy) shared by 2 directories in /:"));
    }

    #[test]
    fn directory_group_ties_follow_directory_order() {
        let sets = vec![
            set(1, &["/z/a", "/y/a"]),
            set(2, &["/c/b", "/d/b"]),
            set(3, &["/m/c", "/n/c"]),
        ];
        let groups = group_by_directories(&sets);
        let first: Vec<&Path> = groups.iter().map(|g| g.directories[0].as_path()).collect();
        assert_eq!(first, [Path::new("/c"), Path::new("/m"), Path::new("/y")]);
    }
}
