//! Logging setup for landchange binaries and job drivers.
//!
//! Records go to a daily rolling file under `<home>/logs` and to stderr.
//! Per-pixel faults are logged at `warn`, so the console shows them even
//! without `--verbose`; stage decisions and engine metrics are `debug`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "landchange=info,landchange_engine=info";

/// Daily log files kept per application before the oldest is removed.
pub const MAX_LOG_FILES: usize = 7;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Log directory; `None` means [`logs_dir`].
    pub log_dir: Option<PathBuf>,
}

/// Keeps the background file writer alive. Dropping it flushes pending records.
#[must_use = "logs are lost once the guard is dropped"]
pub struct LogGuard {
    _file: WorkerGuard,
    path: PathBuf,
}

impl LogGuard {
    /// Directory the rolling log files are written to.
    pub fn log_dir(&self) -> &Path {
        &self.path
    }
}

/// Install the global subscriber.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
            dir
        }
        None => ensure_logs_dir()?,
    };
    let appender = file_appender(&log_dir, config.app_name)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter(config.verbose)),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard {
        _file: guard,
        path: log_dir,
    })
}

/// `RUST_LOG` if set, else [`DEFAULT_LOG_FILTER`].
pub fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// The file filter when verbose, otherwise warnings only.
pub fn console_filter(verbose: bool) -> EnvFilter {
    if verbose {
        file_filter()
    } else {
        EnvFilter::new("warn")
    }
}

/// Daily rolling appender writing `<dir>/<app>.<date>.log`.
pub fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(log_prefix(app_name))
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Application name reduced to characters safe in a file name.
fn log_prefix(app_name: &str) -> String {
    let prefix: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if prefix.is_empty() {
        "landchange".to_string()
    } else {
        prefix
    }
}

/// Get the landchange home directory.
///
/// Priority:
/// 1) LANDCHANGE_HOME
/// 2) ~/.landchange
/// 3) ./.landchange
pub fn landchange_home() -> PathBuf {
    if let Ok(home) = std::env::var("LANDCHANGE_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".landchange")
}

pub fn logs_dir() -> PathBuf {
    landchange_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
