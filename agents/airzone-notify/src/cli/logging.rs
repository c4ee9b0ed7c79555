//! Logging setup
//!
//! Installs the global tracing subscriber from the logging configuration.
//! `RUST_LOG` takes precedence over the configured level.

use anyhow::{bail, Context, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::cli::config::LoggingConfig;

/// Target used for raw frame tracing
pub const WIRE_TARGET: &str = "airzone_notify::wire";

/// Initialize logging. `verbose` forces at least debug level.
///
/// When logging to a file, the returned guard flushes pending lines on drop
/// and must be held for the life of the process.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose && !matches!(config.level.as_str(), "trace" | "debug") {
        "debug"
    } else {
        config.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    match &config.file {
        Some(path) if !path.is_empty() => {
            let file = rotating_file(Path::new(path), config.max_size, config.max_files)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            install(&config.format, filter, writer, false)?;
            Ok(Some(guard))
        }
        _ => {
            install(&config.format, filter, std::io::stdout, true)?;
            Ok(None)
        }
    }
}

/// Log file rotated once it reaches `max_size` bytes, keeping `max_files`
/// rotated copies (`<file>.1` is the newest).
pub fn rotating_file(
    path: &Path,
    max_size: usize,
    max_files: usize,
) -> Result<FileRotate<AppendCount>> {
    if max_size == 0 {
        bail!("logging.max_size must be greater than 0");
    }
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }

    Ok(FileRotate::new(
        path,
        AppendCount::new(max_files),
        ContentLimit::Bytes(max_size),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

fn install<W>(format: &str, filter: EnvFilter, writer: W, ansi: bool) -> Result<()>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);

    let result = match format {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        "pretty" => builder.with_line_number(true).try_init(),
        other => bail!("Unknown log format: {}", other),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
