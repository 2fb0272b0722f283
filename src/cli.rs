use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::policy::DuplicatePolicy;

#[derive(Parser, Debug)]
#[command(name = "find-file-dups")]
#[command(version, about = "Finds duplicate files in directory trees and reports them without deleting anything")]
#[command(after_help = "EXAMPLES:
    find-file-dups ~/Downloads
        Show the 3 largest duplicate groups.
    find-file-dups ~/Downloads --top 10 --fast
        Search quickly for the 10 largest groups; may find fewer than exist.
    find-file-dups ~/Downloads --all --hidden --empty
        Show every group, including hidden and empty files.
    find-file-dups --from-results --by-directory
        Re-analyze the last run, grouped by the directories involved.")]
pub struct Cli {
    /// Directories to scan
    #[arg(value_name = "ROOT", conflicts_with = "from_results")]
    pub roots: Vec<PathBuf>,

    /// Only carry the largest groups between stages. Faster, but may report
    /// fewer groups than exist. Has no effect with --all
    #[arg(long)]
    pub fast: bool,

    /// Show every duplicate group (same as --top 0)
    #[arg(short = 'a', long = "all", conflicts_with = "top")]
    pub show_all: bool,

    /// Number of duplicate groups to show; 0 shows all [default: 3]
    #[arg(short, long, value_name = "K")]
    pub top: Option<usize>,

    /// Include hidden files and directories
    #[arg(long)]
    pub hidden: bool,

    /// Include empty files
    #[arg(long)]
    pub empty: bool,

    /// What makes two files duplicates
    #[arg(long, value_enum)]
    pub policy: Option<DuplicatePolicy>,

    /// Number of parallel threads for reading files (default: number of CPU cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Settings file [default: find-file-dups.toml in the working directory]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where results are stored between runs
    #[arg(long, value_name = "PATH")]
    pub results: Option<PathBuf>,

    /// Also write the uncolored report to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Do not store the results of this run
    #[arg(long, conflicts_with = "from_results")]
    pub no_save: bool,

    /// Show the stored results of the last run instead of scanning
    #[arg(long)]
    pub from_results: bool,

    /// Group stored results by the directories they occur in
    #[arg(long, requires = "from_results")]
    pub by_directory: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
