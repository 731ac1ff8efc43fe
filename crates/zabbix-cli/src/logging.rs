use std::fs::OpenOptions;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zabbix_cli_core::config::LoggingConfig;

/// Level used when nothing is written to a log file.
const STDERR_LEVEL: &str = "warn";

/// Initialize the tracing subscriber.
///
/// With logging enabled and a log file configured, events go to that file at
/// the configured level. Otherwise only warnings and errors reach stderr.
/// `RUST_LOG` overrides the level either way. The returned guard must be
/// held until exit so buffered file output is flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let log_file = config.log_file.as_deref().filter(|_| config.enabled);
    let default_level = match log_file {
        Some(_) => config.log_level.as_str(),
        None => STDERR_LEVEL,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(STDERR_LEVEL));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
            .init();
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}
