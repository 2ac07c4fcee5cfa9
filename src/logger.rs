//! Logging setup for anchorpatch
//!
//! Diagnostics go to stderr through `tracing`. The level comes from the
//! `ANCHORPATCH_LOG` environment variable when set, otherwise from `-v`.
//! With `[logging] debug = true` in the config, everything at debug level is
//! also appended to ~/.anchorpatch/anchorpatch.log.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "ANCHORPATCH_LOG";
const LOG_FILE_NAME: &str = "anchorpatch.log";

/// Keeps the file writer alive; drop it only at exit so buffered lines are flushed.
pub struct LogHandle {
    _guard: Option<WorkerGuard>,
    pub log_file: Option<PathBuf>,
}

/// Filter directive for a `-v` count
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "anchorpatch=warn",
        1 => "anchorpatch=info",
        _ => "anchorpatch=debug",
    }
}

/// Install the global subscriber
pub fn init_logging(verbose: u8, debug_dir: Option<&Path>) -> Result<LogHandle> {
    let stderr_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbose)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    let (file_layer, guard, log_file) = match debug_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(EnvFilter::new("anchorpatch=debug"));
            (Some(layer), Some(guard), Some(dir.join(LOG_FILE_NAME)))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    Ok(LogHandle {
        _guard: guard,
        log_file,
    })
}
