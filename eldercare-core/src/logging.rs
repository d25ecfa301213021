//! File logging for the relay and account tools
//!
//! Both binaries write to a daily-rolling file under the XDG state
//! directory (`~/.local/state/eldercare/`). Nothing is logged to the
//! terminal; stdout belongs to the command output.
//!
//! The Bluetooth stack and the HTTP client are chatty at `debug`, so they
//! are held at `warn` unless `RUST_LOG` names them explicitly.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};

const LOG_FILE_PREFIX: &str = "eldercare.log";

/// Dependencies whose output is capped unless `RUST_LOG` overrides it
const QUIET_TARGETS: &[&str] = &["btleplug", "bluez_async", "hyper", "hyper_util", "reqwest"];

/// Keeps the background writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Install the global subscriber writing to the rolling log file.
///
/// `RUST_LOG` wins over `config.level` when set.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize tracing: {}", e)))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Filter for `level`, with the noisy dependencies capped at `warn`.
fn level_filter(level: &str) -> Result<EnvFilter> {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));

    EnvFilter::try_new(directives.join(","))
        .map_err(|e| Error::Config(format!("logging.level {:?} is invalid: {}", level, e)))
}

/// Route logs to the test harness output. Safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
