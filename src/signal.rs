//! Ctrl+C handling.
//!
//! The handler only raises a shared flag. The scanner polls it per file while
//! enumerating and the refinement engine polls it before each file read.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code used when a run is interrupted (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: u8 = 130;

/// Installs a Ctrl+C handler and returns the flag it sets.
pub fn install_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            // Second Ctrl+C: stop waiting for the current batch.
            std::process::exit(i32::from(EXIT_CODE_INTERRUPTED));
        }
        eprintln!("Interrupted. Finishing current files...");
    })?;
    Ok(flag)
}
