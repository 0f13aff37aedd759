//! Tracing setup for the `imbridge` binary.
//!
//! One-shot commands (`send`, `departments`, `users`) log to stderr only, so
//! their JSON output on stdout stays machine-readable. The relay is long
//! running; when `[relay].logs_dir` is set it also writes JSON lines to a
//! daily-rotated file via [`init_production`].
//!
//! `RUST_LOG` overrides the default filter in both modes.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix for rotated relay logs (`imbridge.log.YYYY-MM-DD`).
const LOG_FILE_PREFIX: &str = "imbridge.log";

/// Keeps the background log writer running.
///
/// Hold it until the relay exits; dropping it flushes buffered lines.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

fn filter_or(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Log relay activity to `logs_dir` as JSON and to stderr as text.
///
/// The directory is created first, so it exists even when another
/// subscriber is already installed.
///
/// # Errors
///
/// Fails when `logs_dir` cannot be created or a global subscriber is
/// already set.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (file_writer, writer_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _writer: writer_guard,
    })
}

/// Log to stderr only, at `default_filter` unless `RUST_LOG` is set.
///
/// One-shot commands pass `warn`; the relay without a logs directory passes
/// `info`. Does nothing if a subscriber is already installed.
pub fn init_cli(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(default_filter))
        .with_writer(std::io::stderr)
        .try_init();
}
