//! Logging setup.
//!
//! Logs go to stderr by default. The config can route them to a daily
//! rolling file or, on Linux, to systemd-journald instead.
//!
//! Log level is read from the `SONGPLAY_LOG` environment variable
//! (`debug`, `info`, `warn`, `error`, or any `EnvFilter` directive) and
//! defaults to `info`.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogTarget, LoggingConfig};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SONGPLAY_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global subscriber. Call once at startup.
pub fn init(config: &LoggingConfig) -> Result<()> {
    match config.target {
        LogTarget::Stderr => init_stderr(),
        LogTarget::File => init_file(config),
        LogTarget::Journald => init_journald(),
    }
}

fn init_stderr() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

fn init_file(config: &LoggingConfig) -> Result<()> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "songplay-etl.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes buffered lines on drop; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

#[cfg(target_os = "linux")]
fn init_journald() -> Result<()> {
    match tracing_journald::layer() {
        Ok(journald_layer) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald_layer)
                .try_init()?;
            tracing::info!("Logging initialized with journald backend");
            Ok(())
        }
        Err(e) => {
            init_stderr()?;
            tracing::warn!("journald unavailable ({}), logging to stderr", e);
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn init_journald() -> Result<()> {
    init_stderr()?;
    tracing::warn!("journald is only supported on Linux, logging to stderr");
    Ok(())
}
