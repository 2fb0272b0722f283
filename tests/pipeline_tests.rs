use std::collections::BTreeSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use find_file_dups::{
    ContentDigest, DuplicatePolicy, FileAccessError, FileSize, Key, KeyExtractor, PrefixChecksum,
    Refiner, ScanFilter, SearchMode, Stage, build_stages, collect_files, rank,
};
use tempfile::{Builder, TempDir};

/// Temporary directory under the canonical temp path, with a name that does
/// not start with a dot so the scanner does not treat it as hidden.
fn scratch_dir() -> TempDir {
    let base = std::env::temp_dir().canonicalize().unwrap();
    Builder::new().prefix("dups-").tempdir_in(base).unwrap()
}

fn refiner() -> Refiner {
    Refiner::new(NonZeroUsize::new(4).unwrap()).unwrap()
}

fn write(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn run(root: &Path, policy: DuplicatePolicy, mode: SearchMode) -> Vec<BTreeSet<PathBuf>> {
    let files = collect_files(&[root.to_path_buf()], ScanFilter::default(), false);
    let refinement = refiner().refine(files, &build_stages(policy, mode)).unwrap();
    as_sets(refinement.clusters)
}

fn as_sets(clusters: Vec<Vec<PathBuf>>) -> Vec<BTreeSet<PathBuf>> {
    let mut sets: Vec<BTreeSet<PathBuf>> = clusters
        .into_iter()
        .map(|cluster| cluster.into_iter().collect())
        .collect();
    sets.sort();
    sets
}

fn fast(top_k: usize) -> SearchMode {
    SearchMode::Fast {
        top_k: NonZeroUsize::new(top_k).unwrap(),
    }
}

#[test]
fn scenario_a_content_hash_groups_renamed_copies() {
    let dir = scratch_dir();
    let root = dir.path();
    let abc: Vec<PathBuf> = vec![
        write(root, "one/a.txt", b"abc"),
        write(root, "two/a.txt", b"abc"),
        write(root, "three/a.txt", b"abc"),
        write(root, "other/renamed.txt", b"abc"),
    ];
    let xyz: Vec<PathBuf> = vec![write(root, "one/x.txt", b"xyz"), write(root, "two/x.txt", b"xyz")];
    write(root, "unique.txt", b"qqqq");

    let groups = run(root, DuplicatePolicy::ContentHash, SearchMode::Exact);
    assert_eq!(groups.len(), 2);
    assert!(groups.contains(&abc.into_iter().collect()));
    assert!(groups.contains(&xyz.into_iter().collect()));
    assert_eq!(groups.iter().map(BTreeSet::len).sum::<usize>(), 6);
}

#[test]
fn name_content_hash_splits_renamed_copy() {
    let dir = scratch_dir();
    let root = dir.path();
    write(root, "one/a.txt", b"abc");
    write(root, "two/a.txt", b"abc");
    let renamed = write(root, "other/renamed.txt", b"abc");

    let groups = run(root, DuplicatePolicy::NameContentHash, SearchMode::Exact);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(!groups[0].contains(&renamed));
}

#[test]
fn scenario_b_empty_files_never_enumerated() {
    let dir = scratch_dir();
    let root = dir.path();
    let empty = write(root, "empty.bin", b"");
    write(root, "full.bin", &[1u8; 100]);

    let files = collect_files(&[root.to_path_buf()], ScanFilter::default(), false);
    assert!(!files.contains(&empty));
    assert_eq!(files.len(), 1);

    let groups = run(root, DuplicatePolicy::ContentHash, SearchMode::Exact);
    assert!(groups.is_empty());
}

#[test]
fn include_empty_groups_empty_files() {
    let dir = scratch_dir();
    let root = dir.path();
    write(root, "a.bin", b"");
    write(root, "b.bin", b"");

    let filter = ScanFilter {
        include_empty: true,
        ..ScanFilter::default()
    };
    let files = collect_files(&[root.to_path_buf()], filter, false);
    let refinement = refiner()
        .refine(files, &build_stages(DuplicatePolicy::ContentHash, SearchMode::Exact))
        .unwrap();
    assert_eq!(refinement.clusters.len(), 1);
}

/// Digest extractor that deletes one file right before the first digest is
/// computed, simulating a file vanishing between enumeration and reading.
struct VanishingDigest {
    victim: PathBuf,
    once: Once,
}

impl KeyExtractor for VanishingDigest {
    fn label(&self) -> &'static str {
        "By Digest"
    }

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError> {
        self.once.call_once(|| fs::remove_file(&self.victim).unwrap());
        ContentDigest.extract(path)
    }
}

#[test]
fn scenario_c_file_vanishing_before_digest() {
    let dir = scratch_dir();
    let root = dir.path();
    let survivors: BTreeSet<PathBuf> = [
        write(root, "a/1.dat", b"payload"),
        write(root, "b/1.dat", b"payload"),
    ]
    .into_iter()
    .collect();
    let victim = write(root, "c/1.dat", b"payload");

    let files = collect_files(&[root.to_path_buf()], ScanFilter::default(), false);
    assert_eq!(files.len(), 3);

    let stages = [
        Stage::new(FileSize),
        Stage::new(PrefixChecksum::default()),
        Stage::new(VanishingDigest {
            victim: victim.clone(),
            once: Once::new(),
        }),
    ];
    let refinement = refiner().refine(files, &stages).unwrap();

    assert_eq!(as_sets(refinement.clusters), vec![survivors]);
    assert_eq!(refinement.failures.len(), 1);
    assert_eq!(refinement.failures[0].path(), victim.as_path());
    assert_eq!(refinement.stages[2].files_failed, 1);
}

#[test]
fn scenario_d_name_checksum_reports_prefix_collisions() {
    let dir = scratch_dir();
    let root = dir.path();
    let mut content = vec![b'p'; 2048];
    let first = write(root, "left/data.bin", &content);
    content[2000] = b'q';
    let second = write(root, "right/data.bin", &content);

    let expected: BTreeSet<PathBuf> = [first, second].into_iter().collect();
    let groups = run(root, DuplicatePolicy::NameChecksum, SearchMode::Exact);
    assert_eq!(groups, vec![expected]);

    // The digest-terminal policy tells them apart.
    assert!(run(root, DuplicatePolicy::NameContentHash, SearchMode::Exact).is_empty());
}

fn build_many_groups(root: &Path) {
    // Group sizes 2..=7, each with distinct content and distinct file size.
    for group in 2..=7usize {
        for copy in 0..group {
            let content = vec![group as u8; 10 + group];
            write(root, &format!("g{group}/copy{copy}.bin"), &content);
        }
    }
    // Same size as group 7 but different prefixes.
    write(root, "noise/n1.bin", &[100u8; 17]);
    write(root, "noise/n2.bin", &[101u8; 17]);
}

#[test]
fn fast_mode_is_subset_of_exact() {
    let dir = scratch_dir();
    build_many_groups(dir.path());

    let exact = run(dir.path(), DuplicatePolicy::ContentHash, SearchMode::Exact);
    assert_eq!(exact.len(), 6);

    for top_k in 1..=3 {
        let approximate = run(dir.path(), DuplicatePolicy::ContentHash, fast(top_k));
        assert!(!approximate.is_empty());
        for group in &approximate {
            assert!(exact.contains(group), "fast mode invented {group:?}");
        }
    }
}

#[test]
fn fast_mode_truncation_bound() {
    let dir = scratch_dir();
    build_many_groups(dir.path());
    let files = collect_files(&[dir.path().to_path_buf()], ScanFilter::default(), false);

    // top_k = 2 limits the size stage to 4 groups out of 6.
    let refinement = refiner()
        .refine(files, &build_stages(DuplicatePolicy::ContentHash, fast(2)))
        .unwrap();
    assert_eq!(refinement.stages[0].groups_formed, 6);
    assert_eq!(refinement.stages[0].groups_retained, 4);
    assert_eq!(refinement.stages[1].clusters_in, 4);
    assert!(refinement.truncated());

    // The largest groups survive.
    let sizes: Vec<usize> = refinement.clusters.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![7, 6, 5, 4]);
}

#[test]
fn exact_mode_never_truncates() {
    let dir = scratch_dir();
    build_many_groups(dir.path());
    let files = collect_files(&[dir.path().to_path_buf()], ScanFilter::default(), false);
    let refinement = refiner()
        .refine(files, &build_stages(DuplicatePolicy::ContentHash, SearchMode::Exact))
        .unwrap();
    assert!(!refinement.truncated());
    assert_eq!(refinement.clusters.len(), 6);
}

#[test]
fn repeated_runs_group_identically() {
    let dir = scratch_dir();
    build_many_groups(dir.path());
    let first = run(dir.path(), DuplicatePolicy::ContentHash, SearchMode::Exact);
    let second = run(dir.path(), DuplicatePolicy::ContentHash, SearchMode::Exact);
    assert_eq!(first, second);
}

#[test]
fn ranked_sets_carry_sizes() {
    let dir = scratch_dir();
    let root = dir.path();
    write(root, "a/big.bin", &[9u8; 500]);
    write(root, "b/big.bin", &[9u8; 500]);
    write(root, "a/small.bin", b"hi");
    write(root, "b/small.bin", b"hi");
    write(root, "c/small.bin", b"hi");

    let files = collect_files(&[root.to_path_buf()], ScanFilter::default(), false);
    let refinement = refiner()
        .refine(files, &build_stages(DuplicatePolicy::ContentHash, SearchMode::Exact))
        .unwrap();
    let sets = rank(refinement.clusters);
    let shape: Vec<(usize, u64)> = sets.iter().map(|s| (s.len(), s.size)).collect();
    assert_eq!(shape, vec![(3, 2), (2, 500)]);
}

/// Records every path it sees, to check that later stages only look at
/// files that survived earlier ones.
struct RecordingDigest {
    seen: Mutex<Vec<PathBuf>>,
}

impl KeyExtractor for RecordingDigest {
    fn label(&self) -> &'static str {
        "By Digest"
    }

    fn extract(&self, path: &Path) -> Result<Key, FileAccessError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        ContentDigest.extract(path)
    }
}

#[test]
fn digest_only_reads_size_and_checksum_survivors() {
    let dir = scratch_dir();
    let root = dir.path();
    write(root, "same1.txt", b"hello");
    write(root, "same2.txt", b"hello");
    write(root, "other_size.txt", b"hello world");
    write(root, "other_prefix.txt", b"jello");

    let digest = std::sync::Arc::new(RecordingDigest {
        seen: Mutex::new(Vec::new()),
    });
    let stages = [
        Stage::new(FileSize),
        Stage::new(PrefixChecksum::default()),
        Stage::from_arc(digest.clone()),
    ];
    let files = collect_files(&[root.to_path_buf()], ScanFilter::default(), false);
    let refinement = refiner().refine(files, &stages).unwrap();

    assert_eq!(refinement.clusters.len(), 1);
    let mut seen: Vec<String> = digest
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    seen.sort();
    assert_eq!(seen, ["same1.txt", "same2.txt"]);
}

#[test]
fn aliased_root_is_not_its_own_duplicate() {
    let dir = scratch_dir();
    let root = dir.path().join("r");
    write(&root, "sub/keep.txt", b"other");
    write(&root, "only.bin", b"single copy");

    let files = collect_files(&[root.clone(), root.join("sub/..")], ScanFilter::default(), false);
    let refinement = refiner()
        .refine(files, &build_stages(DuplicatePolicy::ContentHash, SearchMode::Exact))
        .unwrap();
    assert!(refinement.clusters.is_empty());
}
