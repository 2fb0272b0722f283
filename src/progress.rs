//! Stage progress reporting.
//!
//! The engine pushes counters to a [`ProgressSink`]; sinks only display them.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{HumanCount, ProgressBar, ProgressStyle};

/// Minimum interval between two non-forced terminal updates.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Running counters for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageProgress {
    pub label: String,
    /// Files whose key was computed successfully.
    pub files_inspected: usize,
    /// Groups that have reached two members so far.
    pub duplicate_groups: usize,
    /// Files belonging to such groups.
    pub duplicate_files: usize,
}

impl StageProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Accounts for one file that joined a group now holding `group_len` members.
    pub fn record(&mut self, group_len: usize) {
        self.files_inspected += 1;
        match group_len {
            2 => {
                self.duplicate_groups += 1;
                self.duplicate_files += 2;
            }
            n if n > 2 => self.duplicate_files += 1,
            _ => {}
        }
    }

    pub fn message(&self) -> String {
        format!(
            "({}) {} files checked, {} duplicates found ({} files)",
            self.label,
            HumanCount(self.files_inspected as u64),
            HumanCount(self.duplicate_groups as u64),
            HumanCount(self.duplicate_files as u64)
        )
    }
}

/// Receives stage counters from the refinement engine.
pub trait ProgressSink: Send + Sync {
    fn stage_started(&self, _label: &str, _total_files: usize) {}

    /// `force` is set for the final update of a stage; sinks may drop
    /// intermediate updates but must honor forced ones.
    fn update(&self, progress: &StageProgress, force: bool);

    fn stage_finished(&self, _progress: &StageProgress) {}
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn update(&self, _progress: &StageProgress, _force: bool) {}
}

/// Progress bar on the terminal, one bar per stage.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
    last_update: Mutex<Instant>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            last_update: Mutex::new(Instant::now()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn stage_started(&self, label: &str, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(Self::style());
        pb.set_message(format!("({label})"));
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut bar) = self.bar.lock() {
            *bar = Some(pb);
        }
    }

    fn update(&self, progress: &StageProgress, force: bool) {
        if !force {
            let Ok(mut last_update) = self.last_update.lock() else {
                return;
            };
            if last_update.elapsed() < UPDATE_INTERVAL {
                return;
            }
            *last_update = Instant::now();
        }
        if let Ok(bar) = self.bar.lock() {
            if let Some(pb) = bar.as_ref() {
                pb.set_position(progress.files_inspected as u64);
                pb.set_message(progress.message());
            }
        }
    }

    fn stage_finished(&self, progress: &StageProgress) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
            }
        }
        log::info!("{}", progress.message());
    }
}
