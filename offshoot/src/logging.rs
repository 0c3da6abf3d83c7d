//! Logging setup using tracing + tracing-subscriber.
//!
//! - Stderr output, plain or JSON
//! - Optional file output through a non-blocking writer
//! - Filter from `RUST_LOG`, then `OFFSHOOT_LOG`, then the configured level

use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::process::{in_guarded_work, panic_message};

/// Environment variable read when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "OFFSHOOT_LOG";

static FILE_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

/// Install the global subscriber.
///
/// `verbose` raises the configured level one step per occurrence and `quiet`
/// drops it to errors only. Calling this twice leaves the first subscriber in
/// place.
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<()> {
    let level = determine_level(settings, verbose, quiet);
    let filter = build_env_filter(level);
    let console = build_console_layer(settings.json);

    let file = match &settings.file {
        Some(path) => {
            let (layer, guard) = build_file_layer(path, settings.json)?;
            *FILE_GUARD.lock() = Some(guard);
            Some(layer)
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .is_ok();

    if installed {
        install_panic_hook();
        tracing::debug!(level = %level, file = ?settings.file, json = settings.json, "logging initialized");
    }
    Ok(())
}

/// Write out anything still buffered for the log file.
///
/// Isolated children call this right before exiting, since
/// `std::process::exit` skips the destructor that would otherwise do it.
pub fn flush() {
    drop(FILE_GUARD.lock().take());
}

/// Report panics through tracing instead of raw stderr.
///
/// Panics inside guarded work are logged by the guard, so the hook only
/// notes where they happened.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let message = panic_message(info.payload());
        if in_guarded_work() {
            tracing::debug!(location = %location, panic = message, "contained panic");
        } else {
            tracing::error!(pid = std::process::id(), location = %location, panic = message, "panicked");
        }
    }));
}

fn determine_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    let base = parse_level(&settings.level);
    match verbose {
        0 => base,
        1 => base.max(Level::DEBUG),
        _ => Level::TRACE,
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV))
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
}

fn build_console_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if json {
        Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        )
    } else {
        Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .compact(),
        )
    }
}

fn build_file_layer<S>(path: &Path, json: bool) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("log file path {} has no file name", path.display()))?;

    // Children append to the same file as their parent.
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer: Box<dyn Layer<S> + Send + Sync> = if json {
        Box::new(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_thread_names(true)
                .with_ansi(false),
        )
    } else {
        Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_thread_names(true)
                .with_ansi(false),
        )
    };
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[test]
    fn test_determine_level() {
        let settings = LoggingSettings::default();
        assert_eq!(determine_level(&settings, 0, false), Level::INFO);
        assert_eq!(determine_level(&settings, 1, false), Level::DEBUG);
        assert_eq!(determine_level(&settings, 3, false), Level::TRACE);
        assert_eq!(determine_level(&settings, 2, true), Level::ERROR);

        let settings = LoggingSettings {
            level: "trace".to_string(),
            ..LoggingSettings::default()
        };
        assert_eq!(determine_level(&settings, 1, false), Level::TRACE);
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("offshoot.log");

        let result = build_file_layer::<tracing_subscriber::Registry>(&path, false);

        assert!(result.is_ok());
        assert!(dir.path().join("logs").is_dir());
    }
}
