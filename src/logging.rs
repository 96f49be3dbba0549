//! Tracing setup: stdout plus an optional `paper_bot.log` file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Name of the log file inside the configured directory
pub const LOG_FILE_NAME: &str = "paper_bot.log";

/// Errors raised while installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Cannot open log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Logging already initialised: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter directive for the crate at `level`, unless `RUST_LOG` is set
pub fn filter_directive(level: &str) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| format!("latest_paper_bot={}", level))
}

/// Open (append) the log file inside `dir`, creating the directory
pub fn open_log_file(dir: &Path) -> Result<File, LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(LOG_FILE_NAME);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::Io { path, source })
}

/// Install the global subscriber.
///
/// `level` overrides `config.level` (used for `-v` flags).
pub fn init(config: &LoggingConfig, level: Option<&str>) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(filter_directive(level.unwrap_or(&config.level)))?;

    let file_layer = match &config.directory {
        Some(dir) => {
            let file = Arc::new(open_log_file(dir)?);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file),
            )
        }
        None => None,
    };

    let (text_layer, json_layer) = match config.format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
