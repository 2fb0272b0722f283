use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{HumanCount, HumanDuration};
use log::{debug, error, info, warn};

use find_file_dups::progress::{ProgressSink, SilentProgress, TerminalProgress};
use find_file_dups::report::{self, DuplicateSet};
use find_file_dups::signal::{self, EXIT_CODE_INTERRUPTED};
use find_file_dups::{
    Cli, RefineError, Refiner, ResultStore, RunConfig, Settings, StoredReport,
    build_stages, logging, scanner,
};

fn main() -> ExitCode {
    let start_time = Instant::now();
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
    }
    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    debug!("Command line arguments: {:?}", cli);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    };

    info!("Completed in {}", HumanDuration(start_time.elapsed()));
    code
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let (settings, settings_path) = Settings::discover(cli.config.as_deref(), &cwd)?;
    let config = RunConfig::resolve(cli, settings, settings_path.as_deref(), &cwd)?;
    debug!("Resolved configuration: {:?}", config);
    let store = ResultStore::new(&config.results_path);

    if config.from_results {
        show_stored(&config, &store)?;
        return Ok(ExitCode::SUCCESS);
    }

    let cancel_flag = signal::install_handler().context("Failed to install Ctrl+C handler")?;
    let files = match scanner::collect_files_until(
        &config.roots,
        config.filter,
        config.show_progress,
        &cancel_flag,
    ) {
        Ok(files) => files,
        Err(RefineError::Interrupted) => return Ok(interrupted()),
        Err(e) => return Err(e.into()),
    };

    let stages = build_stages(config.policy, config.mode);
    debug!("Stages: {:?}", stages);
    let progress: Arc<dyn ProgressSink> = if config.show_progress {
        Arc::new(TerminalProgress::new())
    } else {
        Arc::new(SilentProgress)
    };
    let refiner = Refiner::new(config.threads)
        .context("Failed to start worker threads")?
        .with_progress(progress)
        .with_cancel_flag(cancel_flag);

    let refinement = match refiner.refine(files, &stages) {
        Ok(refinement) => refinement,
        Err(RefineError::Interrupted) => return Ok(interrupted()),
        Err(e) => return Err(e.into()),
    };

    if !refinement.failures.is_empty() {
        warn!(
            "{} files could not be read and were left out",
            HumanCount(refinement.failures.len() as u64)
        );
    }
    if refinement.truncated() {
        info!("Fast mode skipped the smaller candidate groups");
    }
    info!(
        "{} duplicate files in {} groups",
        HumanCount(refinement.duplicate_file_count() as u64),
        HumanCount(refinement.clusters.len() as u64)
    );

    let approximate = config.mode.is_approximate();
    let sets = report::rank(refinement.clusters);

    if config.save_results {
        let stored = StoredReport::new(config.roots.clone(), config.policy, approximate, sets.clone());
        store.save(&stored, config.show_progress)?;
    }

    present(&config, &sets, approximate)?;
    Ok(ExitCode::SUCCESS)
}

fn interrupted() -> ExitCode {
    warn!("Interrupted before the search finished; nothing was reported or saved");
    ExitCode::from(EXIT_CODE_INTERRUPTED)
}

fn present(config: &RunConfig, sets: &[DuplicateSet], approximate: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    report::render(sets, config.display_limit, true, &mut out)?;
    writeln!(out)?;
    if sets.is_empty() {
        writeln!(out, "{}", "No duplicate files found!".green())?;
    }
    writeln!(out, "{}", report::summary(sets, approximate).bold())?;
    if !config.policy.verifies_content() {
        writeln!(
            out,
            "{}",
            "Files were matched by name, size and the checksum of their first kilobyte only; \
             contents were not fully compared."
                .yellow()
        )?;
    }

    if let Some(path) = &config.report_path {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        report::render(sets, config.display_limit, false, &mut writer)?;
        writeln!(writer)?;
        writeln!(writer, "{}", report::summary(sets, approximate))?;
        writer.flush()?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn show_stored(config: &RunConfig, store: &ResultStore) -> Result<()> {
    let mut stored = store.load()?;
    info!(
        "Results from {} ({} policy) covering {}",
        stored.created_at,
        stored.policy.name(),
        stored
            .roots
            .iter()
            .map(|root| root.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    report::sort_sets(&mut stored.groups);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if config.by_directory {
        let groups = report::group_by_directories(&stored.groups);
        report::render_directory_groups(&groups, config.display_limit, true, &mut out)?;
    } else {
        report::render(&stored.groups, config.display_limit, true, &mut out)?;
    }
    writeln!(out)?;
    writeln!(out, "{}", report::summary(&stored.groups, stored.approximate).bold())?;
    Ok(())
}
