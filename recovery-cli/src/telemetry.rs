//! Logging setup: stderr console output plus an optional rolling file

use anyhow::Result;
use std::ffi::OsStr;
use std::path::Path;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must live until
/// the process exits. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("recovery={level},recovery_cli={level}")));

    let console_layer = if config.json {
        fmt::layer().with_writer(std::io::stderr).json().boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).with_target(false).boxed()
    };

    let (file_layer, guard) = if let Some(log_path) = &config.file {
        let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory)?;
        let file_name = log_path.file_name().unwrap_or_else(|| OsStr::new("recovery.log"));

        let file_appender = match config.rotation.as_str() {
            "daily" => rolling::daily(directory, file_name),
            "hourly" => rolling::hourly(directory, file_name),
            _ => rolling::never(directory, file_name),
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json()
            .with_current_span(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
