use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use find_file_dups::{DuplicatePolicy, Refiner, SearchMode, build_stages};
use proptest::prelude::*;
use tempfile::TempDir;

/// Contents chosen so that sizes and prefixes collide without the full
/// contents being equal.
fn palette() -> Vec<Vec<u8>> {
    let long = vec![b'a'; 2000];
    let mut long_tail = long.clone();
    long_tail[1999] = b'b';
    vec![
        b"abc".to_vec(),
        b"abd".to_vec(),
        b"xyz".to_vec(),
        b"abcd".to_vec(),
        long,
        long_tail,
    ]
}

fn materialize(dir: &TempDir, picks: &[usize]) -> (Vec<PathBuf>, BTreeMap<usize, BTreeSet<PathBuf>>) {
    let palette = palette();
    let mut files = Vec::new();
    let mut by_content: BTreeMap<usize, BTreeSet<PathBuf>> = BTreeMap::new();
    for (i, &pick) in picks.iter().enumerate() {
        let path = dir.path().join(format!("f{i}.bin"));
        fs::write(&path, &palette[pick]).unwrap();
        by_content.entry(pick).or_default().insert(path.clone());
        files.push(path);
    }
    (files, by_content)
}

fn refine(files: Vec<PathBuf>, mode: SearchMode) -> Vec<BTreeSet<PathBuf>> {
    let refiner = Refiner::new(NonZeroUsize::new(3).unwrap()).unwrap();
    let refinement = refiner
        .refine(files, &build_stages(DuplicatePolicy::ContentHash, mode))
        .unwrap();
    refinement
        .clusters
        .into_iter()
        .map(|cluster| cluster.into_iter().collect())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn exact_mode_finds_exactly_the_content_groups(picks in prop::collection::vec(0usize..6, 0..24)) {
        let dir = TempDir::new().unwrap();
        let (files, by_content) = materialize(&dir, &picks);

        let found = refine(files, SearchMode::Exact);

        let mut seen = HashSet::new();
        for group in &found {
            prop_assert!(group.len() >= 2);
            for path in group {
                prop_assert!(seen.insert(path.clone()), "path in two groups");
            }
        }

        let expected: BTreeSet<BTreeSet<PathBuf>> = by_content
            .into_values()
            .filter(|group| group.len() >= 2)
            .collect();
        let found: BTreeSet<BTreeSet<PathBuf>> = found.into_iter().collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn fast_mode_never_reports_false_groups(
        picks in prop::collection::vec(0usize..6, 0..24),
        top_k in 1usize..4,
    ) {
        let dir = TempDir::new().unwrap();
        let (files, _) = materialize(&dir, &picks);

        let exact: BTreeSet<BTreeSet<PathBuf>> =
            refine(files.clone(), SearchMode::Exact).into_iter().collect();
        let approximate = refine(
            files,
            SearchMode::Fast { top_k: NonZeroUsize::new(top_k).unwrap() },
        );

        prop_assert!(approximate.len() <= exact.len());
        for group in approximate {
            prop_assert!(exact.contains(&group));
        }
    }
}
