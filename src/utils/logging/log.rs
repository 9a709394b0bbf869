//! Uniform log lines for file, table and stage operations.

use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

/// `<operation> <path>` at info level
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{operation} {}", path.display());
}

/// Completion line carrying the row count and, when measured, the duration
pub fn log_operation_complete(
    operation: &str,
    path: &Path,
    rows: usize,
    elapsed: Option<Duration>,
) {
    match elapsed {
        Some(elapsed) => log::info!(
            "Successfully {operation} {rows} rows at {} in {elapsed:?}",
            path.display()
        ),
        None => log::info!("Successfully {operation} {rows} rows at {}", path.display()),
    }
}

/// Pipeline stage transition, e.g. `[silver] cleaning and de-identifying`
pub fn log_stage(stage: impl Display, message: &str) {
    log::info!("[{stage}] {message}");
}

/// Recoverable anomaly in the input, optionally tied to a file
pub fn log_warning(message: &str, path: Option<&Path>) {
    match path {
        Some(path) => log::warn!("{message}: {}", path.display()),
        None => log::warn!("{message}"),
    }
}
