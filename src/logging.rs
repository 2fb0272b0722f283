//! Terminal logging setup.
//!
//! Log lines go to stderr through `simplelog`, timestamped in local time when
//! the local offset can be determined and in UTC otherwise.

use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Level for the given CLI flags: errors only when quiet, otherwise info,
/// debug (`-v`) or trace (`-vv`).
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the global logger. Calling it twice leaves the first logger in
/// place and returns an error.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), log::SetLoggerError> {
    let level = level_for(verbose, quiet);

    let mut builder = ConfigBuilder::new();
    builder
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off);
    if builder.set_time_offset_to_local().is_err() {
        // Offset is unknown in multi-threaded processes on some platforms.
        builder.set_time_offset(time::UtcOffset::UTC);
    }

    TermLogger::init(level, builder.build(), TerminalMode::Stderr, ColorChoice::Auto)?;
    log::debug!("Logging initialized at level {level:?}");
    Ok(())
}
