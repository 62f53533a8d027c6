//! Logging initialization using tracing.

use anyhow::Result;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::domain::models::config::LoggingConfig;

/// Initialized logging stack; keep the guard alive for the process
/// lifetime so buffered file output flushes.
pub struct Logging {
    _guard: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber from configuration.
pub fn init(config: &LoggingConfig) -> Result<Logging> {
    let default_level = parse_log_level(&config.level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let guard = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::daily(log_dir, "cortex.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        // File output is always JSON for structured ingestion.
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        if config.format == "json" {
            let stdout_layer = tracing_subscriber::fmt::layer().json().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stdout_layer)
                .try_init()?;
        } else {
            let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stdout_layer)
                .try_init()?;
        }
        Some(guard)
    } else {
        if config.format == "json" {
            let stdout_layer = tracing_subscriber::fmt::layer().json().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .try_init()?;
        } else {
            let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .try_init()?;
        }
        None
    };

    Ok(Logging { _guard: guard })
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("unknown log level: {other}"),
    }
}
