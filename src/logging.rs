use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Console filter: warnings only unless debugging; `RUST_LOG` wins when set.
fn console_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Create the log directory if it doesn't exist.
pub fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Build the daily rolling appender under `log_dir`.
///
/// Fails instead of panicking when the directory cannot be created or the
/// log file cannot be opened.
pub fn build_file_appender(log_dir: &Utf8Path, log_prefix: &str) -> Result<RollingFileAppender> {
    ensure_log_dir(log_dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(log_prefix)
        .build(log_dir)
        .with_context(|| format!("Failed to open log file in {}", log_dir))
}

/// Setup logging with console output and an optional rotating file log.
///
/// Console output goes to stderr so command output on stdout stays clean.
/// When `log_dir` is given, an `info`-level log is also written there with
/// daily rotation. A log directory that cannot be used is reported as a
/// warning and the run continues with console logging only.
///
/// # Arguments
/// * `log_dir` - Directory for log files, or `None` for console only
/// * `log_prefix` - Prefix for log files (e.g., "expirefiles")
/// * `debug_mode` - If true, console logs at debug level
///
/// # Returns
/// A guard that must be held for the duration of the program to keep file
/// logging active
pub fn setup_logging(
    log_dir: Option<&Utf8Path>,
    log_prefix: &str,
    debug_mode: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(debug_mode));

    let appender = log_dir.map(|dir| (dir, build_file_appender(dir, log_prefix)));

    let (log_dir, file_appender) = match appender {
        Some((dir, Ok(file_appender))) => (dir, file_appender),
        Some((dir, Err(e))) => {
            tracing_subscriber::registry()
                .with(console_layer)
                .try_init()
                .context("Failed to initialize logging")?;
            tracing::warn!("File logging disabled for {}: {:#}", dir, e);
            return Ok(None);
        }
        None => {
            tracing_subscriber::registry()
                .with(console_layer)
                .try_init()
                .context("Failed to initialize logging")?;
            return Ok(None);
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::new(if debug_mode { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}",
        log_dir,
        log_prefix,
        debug_mode
    );

    Ok(Some(guard))
}
