//! Log subscriber setup

use crate::errors::{PipelineError, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "RAGBUDDY_LOG";

static INIT: OnceLock<()> = OnceLock::new();

/// Build the filter directive for a base level
pub fn default_directive(level: &str) -> String {
    format!("ragbuddy={}", level)
}

/// Install the global subscriber.
///
/// `RAGBUDDY_LOG` wins over `level` when set and parseable. Console output
/// goes to stderr; when `file` is given, records are also appended there
/// without ANSI colors. Calling this more than once is a no-op.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let file_layer = match file {
        Some(path) => {
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    PipelineError::Configuration(format!(
                        "Failed to open log file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(handle)),
            )
        }
        None => None,
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only when another subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    let _ = INIT.set(());
    Ok(())
}
