//! Structured logging and tracing for the Combined Energy client
//!
//! This module installs the `tracing` subscriber (console plus a daily-rotated
//! log file) and hands out component loggers that prefix every line with
//! their context fields.

use crate::config::LoggingConfig;
use crate::error::{CombinedEnergyError, Result};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;
mod structured;

pub use level::{min_level, parse_log_level};
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Environment variable that keeps logging on the console only
pub const ENV_DISABLE_FILE_LOG: &str = "COMBINED_ENERGY_DISABLE_FILE_LOG";

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let base_level = parse_log_level(&config.level)?;

            let console_level = config
                .console_level
                .as_ref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);
            let file_level = config
                .file_level
                .as_ref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);

            // Most verbose level so the per-layer filters can narrow down
            let filter = build_env_filter(min_level(console_level, file_level));

            if should_use_console_only() {
                init_console_only_logging(filter, config.json_format, console_level);
                return Ok(());
            }

            init_file_logging(config, filter, console_level, file_level)
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(CombinedEnergyError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("combined_energy={},reqwest=warn,hyper=warn", level).into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os(ENV_DISABLE_FILE_LOG).is_some()
}

/// Formatting layer writing to `writer`, filtered to `level`
fn output_layer<S, W>(
    writer: W,
    json_format: bool,
    ansi: bool,
    level: Level,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_ansi(ansi);
    let filter = LevelFilter::from_level(level);
    if json_format {
        base.json().with_filter(filter).boxed()
    } else {
        base.with_filter(filter).boxed()
    }
}

fn init_console_only_logging(filter: EnvFilter, json_format: bool, console_level: Level) {
    // try_init: the host or a test harness may already own the global subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(std::io::stdout, json_format, true, console_level))
        .try_init();

    info!(
        "Logging initialized - console_level: {:?}, console-only",
        console_level
    );
}

/// Directory holding the rotated files; a configured file name contributes only its parent
fn log_directory(file: &str) -> &Path {
    let path = Path::new(file);
    if path.extension().is_some() {
        path.parent().unwrap_or(path)
    } else {
        path
    }
}

fn init_file_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    console_level: Level,
    file_level: Level,
) -> Result<()> {
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("combined_energy")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(log_directory(&config.file))
        .map_err(|e| {
            CombinedEnergyError::io(format!("Failed to create log file appender: {}", e))
        })?;

    let (writer, guard) = non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let console = config
        .console_output
        .then(|| output_layer(std::io::stdout, config.json_format, true, console_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(writer, config.json_format, false, file_level))
        .with(console)
        .try_init()
        .map_err(|e| CombinedEnergyError::config(format!("Failed to install logger: {}", e)))?;

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
        console_level, file_level, config.file
    );
    Ok(())
}
