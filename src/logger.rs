use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::parse::LoggingConfig;

/// Environment override for the configured level.
pub const LOG_ENV: &str = "SIDECAR_LOG";

/*
    @@@
    @init_logging();
    . Creates a daily-rotating log file (<directory>/<file>) and wraps it in a non-blocking writer.
    . Level comes from SIDECAR_LOG, then the config, then INFO.
    . Keeps the appender alive by returning the guard; drop it only at process exit.
*/
pub fn init_logging(cfg: &LoggingConfig) -> Result<WorkerGuard> {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|s| parse_level(&s))
        .or_else(|| parse_level(&cfg.level))
        .unwrap_or(Level::INFO);

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cfg.directory, &cfg.file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = SubscriberBuilder::default()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_writer(non_blocking)
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set global subscriber")?;
    Ok(guard)
}

fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
