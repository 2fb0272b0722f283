pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod logging;
pub mod policy;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod signal;
pub mod store;

pub use cli::Cli;
pub use config::{RunConfig, Settings};
pub use engine::{Cluster, Refinement, Refiner, Stage, StageStats};
pub use error::{ConfigError, FileAccessError, RefineError};
pub use keys::{BaseName, ContentDigest, FileSize, Key, KeyExtractor, PrefixChecksum};
pub use policy::{DuplicatePolicy, SearchMode, build_stages};
pub use report::{DuplicateSet, rank, render, summary};
pub use scanner::{ScanFilter, collect_files, collect_files_until, enumerate};
pub use store::{ResultStore, StoredReport};
