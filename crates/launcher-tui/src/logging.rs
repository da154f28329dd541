use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE: &str = "launcher.log";
pub const LOG_ENV: &str = "AI_LAUNCHER_LOG";

/// Send `tracing` output to `<dir>/launcher.log`.
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes and stops the background writer.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Could not start logging: {}", e))?;

    Ok(guard)
}
