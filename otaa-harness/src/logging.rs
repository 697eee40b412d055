//! Log sinks of the harness.
//!
//! Test verdicts are logged with the [`RESULT_TARGET`] target. They go to the
//! console like everything else and are also collected in the result file,
//! whatever the console filter says.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, Level, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Target of every test verdict line.
pub const RESULT_TARGET: &str = "otaa::result";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// File receiving the test verdicts.
    pub test_log: Option<PathBuf>,
    /// File receiving everything at DEBUG and above.
    pub debug_log: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to install the log subscriber: {0}")]
    Init(String),
}

/// Installs the subscriber described by `config` as the global default.
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    subscriber(config)?.try_init().map_err(|e| LoggingError::Init(e.to_string()))
}

/// Opens the result log with the harness version.
pub fn log_banner() {
    info!(target: RESULT_TARGET, "OTAA Test Harness Version {}", env!("CARGO_PKG_VERSION"));
}

/// Console layer filtered by `RUST_LOG` (default `info`), plus the optional
/// result and debug files.
pub fn subscriber(
    config: &LogConfig,
) -> Result<impl Subscriber + Send + Sync + 'static, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(true).with_filter(env_filter);

    let results = match &config.test_log {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(open(path)?))
                .with_filter(results_filter()),
        ),
        None => None,
    };

    let debug = match &config.debug_log {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_writer(Mutex::new(open(path)?))
                .with_filter(LevelFilter::DEBUG),
        ),
        None => None,
    };

    Ok(tracing_subscriber::registry().with(console).with(results).with(debug))
}

fn results_filter() -> Targets {
    Targets::new().with_target(RESULT_TARGET, Level::INFO)
}

fn open(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::Open { path: path.to_path_buf(), source })
}
