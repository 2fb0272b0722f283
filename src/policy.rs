//! Duplicate-definition policies and search modes, turned into stage lists.

use std::num::NonZeroUsize;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::engine::Stage;
use crate::keys::{BaseName, ContentDigest, FileSize, PrefixChecksum};

const TWO: NonZeroUsize = NonZeroUsize::new(2).unwrap();

/// What makes two files duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Same size and same full-content digest.
    #[default]
    ContentHash,
    /// Same base name, size and checksum of the first kilobyte. Contents are
    /// not fully compared, so distinct files can be reported together.
    NameChecksum,
    /// Same base name and same full-content digest.
    NameContentHash,
}

impl DuplicatePolicy {
    pub fn name(self) -> &'static str {
        match self {
            Self::ContentHash => "content-hash",
            Self::NameChecksum => "name-checksum",
            Self::NameContentHash => "name-content-hash",
        }
    }

    /// Whether the pipeline ends with a full-content digest.
    pub fn verifies_content(self) -> bool {
        !matches!(self, Self::NameChecksum)
    }

    fn matches_name(self) -> bool {
        matches!(self, Self::NameChecksum | Self::NameContentHash)
    }
}

/// How thoroughly to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// No group is ever dropped before the terminal stage.
    Exact,
    /// Only the largest groups are carried forward, aiming at the `top_k`
    /// largest duplicate sets. May report fewer groups than exist.
    Fast { top_k: NonZeroUsize },
}

impl SearchMode {
    pub fn is_approximate(self) -> bool {
        matches!(self, Self::Fast { .. })
    }

    fn size_limit(self) -> Option<NonZeroUsize> {
        match self {
            Self::Exact => None,
            Self::Fast { top_k } => Some(top_k.saturating_mul(top_k)),
        }
    }

    fn checksum_limit(self) -> Option<NonZeroUsize> {
        match self {
            Self::Exact => None,
            Self::Fast { top_k } => Some(top_k.saturating_mul(TWO)),
        }
    }
}

/// Builds the ordered stage list for a policy and mode.
pub fn build_stages(policy: DuplicatePolicy, mode: SearchMode) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(4);
    if policy.matches_name() {
        stages.push(Stage::new(BaseName));
    }
    stages.push(Stage::new(FileSize).with_retention_limit(mode.size_limit()));
    stages.push(Stage::new(PrefixChecksum::default()).with_retention_limit(mode.checksum_limit()));
    if policy.verifies_content() {
        stages.push(Stage::new(ContentDigest));
    }
    stages
}
