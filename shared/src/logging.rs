//! Logging utilities
//!
//! The library only emits `tracing` events; binaries pick one of these to
//! install a subscriber.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with file and console output
///
/// # Arguments
/// * `log_dir` - Directory to store log files
/// * `prefix` - Prefix for log file names (e.g., "mirror_emulator-5554")
/// * `level` - Default filter when `RUST_LOG` is unset (debug, info, ...)
///
/// # Returns
/// Path of the log file that was created
pub fn init_logging(log_dir: &str, prefix: &str, level: &str) -> crate::Result<PathBuf> {
    let log_path = Path::new(log_dir);
    if !log_path.exists() {
        fs::create_dir_all(log_path)?;
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let log_file = log_path.join(format!("{}_{}.log", sanitize(prefix), timestamp));
    let file = fs::File::create(&log_file)?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| crate::Error::Other(format!("Failed to set subscriber: {}", e)))?;

    tracing::info!("Logging initialized - file: {:?}", log_file);

    Ok(log_file)
}

/// Initialize simple console-only logging
pub fn init_console_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .init();
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Serials may contain ':' (network devices); keep file names portable
fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
